//! Composition root.
//!
//! [`DocragEngine`] owns the shared caches (model sessions, tokenizers,
//! responses) and wires every component from one [`AppConfig`]. Nothing in
//! the crate keeps process-wide state; two engines are fully independent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use docrag_db::vector::{open_vector_store, SearchOutcome, VectorStoreBackend, VectorStoreGateway};
use docrag_model::{
    CandleSessionLoader, ModelLocator, ModelRegistry, ModelSessionManager, ModelTask, SessionLoader,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::embedder::EmbeddingGenerator;
use crate::errors::DocragResult;
use crate::generation::GenerationService;
use crate::ingest::{DocumentStore, IngestOutcome, IngestionPipeline, Upload};
use crate::middleware::logged;
use crate::parse::DocumentParser;
use crate::retrieval::{ConversationalRetrievalService, ResponseCache};

pub struct DocragEngine {
    config: AppConfig,
    sessions: Arc<ModelSessionManager>,
    gateway: VectorStoreGateway,
    pipeline: IngestionPipeline,
    retrieval: ConversationalRetrievalService,
}

impl std::fmt::Debug for DocragEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocragEngine")
            .field("sessions", &self.sessions)
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl DocragEngine {
    /// Build with Candle sessions and the configured vector store.
    pub fn from_config(config: AppConfig, documents: Arc<dyn DocumentStore>) -> DocragResult<Self> {
        let loader = Arc::new(CandleSessionLoader::new(config.session_config()));
        let backend = open_vector_store(&config.vector_store_config())?;
        Self::from_parts(config, documents, loader, backend)
    }

    /// Build with explicit session loader and vector backend.
    pub fn from_parts(
        config: AppConfig,
        documents: Arc<dyn DocumentStore>,
        loader: Arc<dyn SessionLoader>,
        backend: Arc<dyn VectorStoreBackend>,
    ) -> DocragResult<Self> {
        for warning in config.validate()? {
            warn!("Config warning: {}", warning);
        }

        let session_config = config.session_config();
        let registry = ModelRegistry::new(locator(&config))
            .with_max_sequence_length(session_config.max_sequence_length);
        let sessions = Arc::new(ModelSessionManager::new(registry, loader, &session_config));

        let store_config = config.vector_store_config();
        let gateway = VectorStoreGateway::new(backend, store_config.environment)
            .with_health_timeout(store_config.health_timeout());

        let embedder = EmbeddingGenerator::new(
            Arc::clone(&sessions),
            config.models.embedding_model.clone(),
            config.models.embedding_batch_size,
        );
        let generation = GenerationService::new(Arc::clone(&sessions), config.retrieval.max_answer_tokens)
            .with_answer_model(config.models.generation_model.clone())
            .with_summary_model(config.models.summarization_model.clone())
            .with_answer_task(config.retrieval.answer_task);

        let parser = DocumentParser::from_config(&config.extraction)?;
        let mut pipeline = IngestionPipeline::new(parser, embedder.clone(), gateway.clone(), documents);
        if config.extraction.summarize_description {
            pipeline = pipeline.with_summarizer(generation.clone());
        }

        let cache = ResponseCache::new(
            config.retrieval.cache_capacity,
            Duration::from_secs(config.retrieval.cache_ttl_secs),
        );
        let retrieval =
            ConversationalRetrievalService::new(embedder, gateway.clone(), generation, cache, &store_config);

        debug!(backend = gateway.backend().name(), environment = %store_config.environment, "Engine ready");
        Ok(Self {
            config,
            sessions,
            gateway,
            pipeline,
            retrieval,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<ModelSessionManager> {
        &self.sessions
    }

    pub fn gateway(&self) -> &VectorStoreGateway {
        &self.gateway
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    pub fn retrieval(&self) -> &ConversationalRetrievalService {
        &self.retrieval
    }

    pub async fn ingest(&self, upload: &Upload) -> IngestOutcome {
        logged("ingest", self.pipeline.ingest(upload)).await
    }

    /// Hash a local file and ingest it.
    pub async fn ingest_path(&self, path: &Path, extension: Option<&str>) -> DocragResult<IngestOutcome> {
        let upload = Upload::from_path(path, extension)?;
        Ok(self.ingest(&upload).await)
    }

    pub async fn answer(&self, question: &str, document_id: &str) -> String {
        logged("answer", self.retrieval.answer(question, document_id)).await
    }

    pub async fn search(&self, question: &str, document_id: &str) -> DocragResult<SearchOutcome> {
        logged("search", self.retrieval.search(question, document_id)).await
    }

    pub async fn delete_document(&self, content_hash: &str) -> bool {
        logged("delete_document", self.pipeline.delete_document(content_hash)).await
    }
}

fn locator(config: &AppConfig) -> ModelLocator {
    match &config.models.dir {
        Some(dir) => ModelLocator::with_base_dir(dir.clone()),
        None => ModelLocator::new(),
    }
}

// ============================================================================
// Model listing
// ============================================================================

/// One registry entry and whether its files are installed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub task: ModelTask,
    pub name: String,
    pub model_id: String,
    pub default: bool,
    pub installed: bool,
}

/// Every known model with its install status under the configured models dir.
pub fn list_models(config: &AppConfig) -> Vec<ModelStatus> {
    let locator = locator(config);
    ModelRegistry::entries()
        .iter()
        .map(|entry| {
            let installed = locator
                .model_path(entry.task.models_subdir(), entry.model_id)
                .and_then(|path| locator.validate_model_dir(&path))
                .is_ok();
            ModelStatus {
                task: entry.task,
                name: entry.name().to_string(),
                model_id: entry.model_id.to_string(),
                default: entry.default,
                installed,
            }
        })
        .collect()
}
