//! Document ingestion.
//!
//! ```text
//! Upload ─► duplicate check ─► parse ─► embed ─► save_embedding ─► save_document
//! ```
//!
//! The document record is written last, only after every vector is stored.
//! A failure at any stage stops the pipeline. Where collections may be
//! dropped, neither store is left holding half a document; in production the
//! stored vectors stay and the next attempt reuses them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use docrag_db::vector::{collection_name, EmbeddingRecord, VectorStoreGateway};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::content_hash::hash_file;
use crate::embedder::EmbeddingGenerator;
use crate::errors::{DocragError, DocragResult};
use crate::generation::GenerationService;
use crate::middleware::LoggedOutcome;
use crate::parse::{truncate_chars, DocumentMeta, DocumentParser, ParseOutcome, ParsedDocument, DESCRIPTION_MAX_CHARS};

// ============================================================================
// Upload
// ============================================================================

/// A file already persisted to local storage, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the file bytes.
    pub content_hash: String,
    /// Declared or detected extension, without the dot.
    pub extension: String,
}

impl Upload {
    pub fn new(path: impl Into<PathBuf>, content_hash: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            extension: extension.into(),
        }
    }

    /// Hash the file and take the extension from its name, unless one is given.
    pub fn from_path(path: &Path, extension: Option<&str>) -> DocragResult<Self> {
        let extension = match extension {
            Some(ext) => ext.trim_start_matches('.').to_string(),
            None => path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string)
                .ok_or_else(|| DocragError::UnsupportedFileType(path.display().to_string()))?,
        };
        Ok(Self::new(path, hash_file(path)?, extension))
    }
}

// ============================================================================
// DocumentStore
// ============================================================================

/// The relational document layer, owned outside the engine.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn has_document(&self, content_hash: &str) -> DocragResult<bool>;

    async fn save_document(&self, content_hash: &str, meta: &DocumentMeta) -> DocragResult<()>;
}

// ============================================================================
// IngestOutcome
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Ingested {
        content_hash: String,
        collection: String,
        segments: usize,
        meta: DocumentMeta,
    },
    /// Same content was ingested before; nothing was written.
    Duplicate { content_hash: String },
    Failed { content_hash: String, reason: String },
}

impl IngestOutcome {
    fn failed(content_hash: &str, reason: impl Into<String>) -> Self {
        Self::Failed {
            content_hash: content_hash.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_ingested(&self) -> bool {
        matches!(self, Self::Ingested { .. })
    }
}

impl LoggedOutcome for IngestOutcome {
    fn failure(&self) -> Option<String> {
        match self {
            Self::Failed { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }
}

// ============================================================================
// IngestionPipeline
// ============================================================================

/// One async lock per content hash, dropped once nobody holds or awaits it.
#[derive(Default)]
struct HashLocks {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl HashLocks {
    fn lock_for(&self, content_hash: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);
        if let Some(lock) = locks.get(content_hash).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(content_hash.to_string(), Arc::downgrade(&lock));
        lock
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    parser: DocumentParser,
    embedder: EmbeddingGenerator,
    gateway: VectorStoreGateway,
    documents: Arc<dyn DocumentStore>,
    summarizer: Option<GenerationService>,
    in_flight: Arc<HashLocks>,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("parser", &self.parser)
            .field("gateway", &self.gateway)
            .field("summarize", &self.summarizer.is_some())
            .finish()
    }
}

impl IngestionPipeline {
    pub fn new(
        parser: DocumentParser,
        embedder: EmbeddingGenerator,
        gateway: VectorStoreGateway,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            parser,
            embedder,
            gateway,
            documents,
            summarizer: None,
            in_flight: Arc::default(),
        }
    }

    /// Replace the first-paragraph description with a generated summary.
    pub fn with_summarizer(mut self, summarizer: GenerationService) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Ingest one upload.
    ///
    /// Runs one at a time per content hash: a concurrent upload of the same
    /// content waits for the first and then sees it as a duplicate.
    pub async fn ingest(&self, upload: &Upload) -> IngestOutcome {
        let lock = self.in_flight.lock_for(&upload.content_hash);
        let _guard = lock.lock().await;
        self.ingest_locked(upload).await
    }

    async fn ingest_locked(&self, upload: &Upload) -> IngestOutcome {
        let hash = upload.content_hash.as_str();

        match self.documents.has_document(hash).await {
            Ok(true) => {
                info!(content_hash = hash, "Duplicate content, skipping ingestion");
                return IngestOutcome::Duplicate {
                    content_hash: hash.to_string(),
                };
            }
            Ok(false) => {}
            Err(e) => return IngestOutcome::failed(hash, format!("document lookup failed: {e}")),
        }

        let collection = match collection_name(hash) {
            Ok(name) => name,
            Err(e) => return IngestOutcome::failed(hash, e.to_string()),
        };

        // A collection without a document record is left over from an
        // interrupted run. Rebuild it, or, where drops are refused, reuse it
        // when it holds the whole document.
        let mut stored = None;
        if self.gateway.has_collection(&collection).await {
            if self.gateway.environment().allows_drop() {
                warn!(collection = %collection, "Found orphaned collection, rebuilding");
                if !self.gateway.delete_collection(&collection).await {
                    return IngestOutcome::failed(hash, "orphaned collection could not be removed");
                }
            } else {
                match self.gateway.count(&collection).await {
                    Some(rows) if rows > 0 => stored = Some(rows),
                    _ => return IngestOutcome::failed(hash, "orphaned collection could not be removed"),
                }
            }
        }

        let parsed = match self.parse(upload).await {
            Ok(parsed) => parsed,
            Err(reason) => return IngestOutcome::failed(hash, reason),
        };
        let texts: Vec<String> = parsed.segments.iter().map(|s| s.text.clone()).collect();

        match stored {
            Some(rows) if rows == texts.len() => {
                info!(collection = %collection, rows, "Resuming from stored vectors");
            }
            Some(rows) => {
                error!(collection = %collection, rows, segments = texts.len(), "Orphaned collection is incomplete");
                return IngestOutcome::failed(
                    hash,
                    format!(
                        "orphaned collection holds {rows} records but the document has {} segments",
                        texts.len()
                    ),
                );
            }
            None => {
                let records = match self.embedder.embed(&texts).await {
                    Ok(records) => attach_metadata(records, &parsed),
                    Err(e) => {
                        error!(content_hash = hash, kind = e.kind(), error = %e, "Embedding failed");
                        return IngestOutcome::failed(hash, e.to_string());
                    }
                };
                if !self.save_embedding(hash, &records).await {
                    return IngestOutcome::failed(hash, "vector store did not accept the embeddings");
                }
            }
        }

        let meta = self.describe(parsed.meta, &texts).await;
        if let Err(e) = self.documents.save_document(hash, &meta).await {
            error!(content_hash = hash, error = %e, "Saving document failed, removing its vectors");
            // Refused in production; the next ingest resumes from these vectors.
            self.gateway.delete_collection(&collection).await;
            return IngestOutcome::failed(hash, format!("document save failed: {e}"));
        }

        info!(
            content_hash = hash,
            collection = %collection,
            segments = texts.len(),
            title = %meta.title,
            "Ingested document"
        );
        IngestOutcome::Ingested {
            content_hash: hash.to_string(),
            collection,
            segments: texts.len(),
            meta,
        }
    }

    /// Parse with a splitter measuring in embedding-model tokens and capped
    /// at the encoder's context.
    async fn parse(&self, upload: &Upload) -> Result<ParsedDocument, String> {
        let session = self.embedder.session().await.map_err(|e| e.to_string())?;
        let splitter = self
            .parser
            .splitter()
            .clone()
            .for_encoder(Arc::clone(session.tokenizer()), session.descriptor().max_context_length);

        match self.parser.parse_with(&upload.path, &upload.extension, &splitter).await {
            ParseOutcome::Parsed(parsed) => Ok(parsed),
            ParseOutcome::Failed { reason } => Err(reason),
        }
    }

    async fn describe(&self, mut meta: DocumentMeta, texts: &[String]) -> DocumentMeta {
        let (Some(summarizer), Some(first)) = (&self.summarizer, texts.first()) else {
            return meta;
        };
        match summarizer.summarize(first).await {
            Ok(summary) if !summary.trim().is_empty() => {
                meta.description = truncate_chars(summary.trim(), DESCRIPTION_MAX_CHARS);
            }
            Ok(_) => debug!("Summary was empty, keeping first-paragraph description"),
            Err(e) => warn!(error = %e, "Summarization failed, keeping first-paragraph description"),
        }
        meta
    }

    /// Store a document's records in its collection, creating it with the
    /// records' dimension if needed. A collection created here is removed
    /// again when the insert fails.
    pub async fn save_embedding(&self, content_hash: &str, records: &[EmbeddingRecord]) -> bool {
        let Some(first) = records.first() else {
            warn!(content_hash, "No records to save");
            return false;
        };
        let collection = match collection_name(content_hash) {
            Ok(name) => name,
            Err(e) => {
                warn!(content_hash, error = %e, "Invalid collection name");
                return false;
            }
        };

        let existed = self.gateway.has_collection(&collection).await;
        if !self.gateway.ensure_collection(&collection, first.vector.len()).await {
            return false;
        }
        if self.gateway.insert(&collection, records).await {
            return true;
        }

        if !existed && self.gateway.environment().allows_drop() {
            warn!(collection = %collection, "Insert failed, removing new collection");
            self.gateway.delete_collection(&collection).await;
        }
        false
    }

    /// Remove a document's vectors. Waits for an ingest of the same content.
    pub async fn delete_document(&self, content_hash: &str) -> bool {
        let lock = self.in_flight.lock_for(content_hash);
        let _guard = lock.lock().await;
        match collection_name(content_hash) {
            Ok(collection) => self.gateway.delete_collection(&collection).await,
            Err(e) => {
                warn!(content_hash, error = %e, "Invalid collection name");
                false
            }
        }
    }
}

/// Tag each record with where its text came from.
fn attach_metadata(records: Vec<EmbeddingRecord>, parsed: &ParsedDocument) -> Vec<EmbeddingRecord> {
    records
        .into_iter()
        .zip(&parsed.segments)
        .map(|(record, segment)| {
            let meta = &segment.metadata;
            record.with_metadata(json!({
                "fileType": parsed.file_type,
                "filename": meta.filename,
                "title": parsed.meta.title,
                "location": meta.location,
                "category": meta.category,
                "page": meta.page,
            }))
        })
        .collect()
}
