//! # docrag-core
//!
//! Document ingestion and retrieval-augmented question answering.
//!
//! This crate turns uploaded files into per-document vector collections and
//! answers questions against them. It is designed to be consumed by the
//! `docrag` CLI and by any service layer that owns uploads and the
//! relational document records.
//!
//! ## Main Types
//!
//! - [`DocragEngine`] – composition root exposing ingest, answer, search and delete
//! - [`IngestionPipeline`] – parse, embed and persist one upload
//! - [`ConversationalRetrievalService`] – cached question answering over one document
//! - [`DocragError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`loader`] – file types, format loaders and the layout extraction client
//! - [`splitter`] – token-aware recursive splitting into segments
//! - [`parse`] – load + split + metadata derivation with soft failures
//! - [`embedder`] – numbered embedding records over the similarity session
//! - [`generation`] – prompt construction, answering and summarization
//! - [`retrieval`] – response cache and question answering
//! - [`ingest`] – uploads, the document store seam and the ingestion pipeline
//! - [`middleware`] – request logging around engine operations
//!
//! ## Example
//!
//! ```ignore
//! use docrag_core::{AppConfig, DocragEngine, Upload};
//!
//! let config = AppConfig::load(None)?;
//! let engine = DocragEngine::from_config(config, documents)?;
//!
//! let upload = Upload::from_path(Path::new("report.pdf"), None)?;
//! let outcome = engine.ingest(&upload).await;
//!
//! let answer = engine.answer("What is the total?", &upload.content_hash).await;
//! ```

pub mod config;
pub mod content_hash;
pub mod embedder;
pub mod engine;
pub mod errors;
pub mod generation;
pub mod ingest;
pub mod loader;
pub mod middleware;
pub mod parse;
pub mod retrieval;
pub mod splitter;

pub use config::{AppConfig, ExtractionSection, ModelsSection, RetrievalSection, StorageSection};
pub use content_hash::{hash_bytes, hash_file};
pub use embedder::EmbeddingGenerator;
pub use engine::{list_models, DocragEngine, ModelStatus};
pub use errors::{DocragError, DocragResult};
pub use generation::{build_qa_prompt, GenerationService};
pub use ingest::{DocumentStore, IngestOutcome, IngestionPipeline, Upload};
pub use loader::{
    BlockCategory, DocumentLoader, ExtractionStrategy, FileType, LoadedDocument, LoaderMetadata,
    RawBlock, UnstructuredClient,
};
pub use middleware::{logged, LoggedOutcome};
pub use parse::{DocumentMeta, DocumentParser, ParseOutcome, ParsedDocument};
pub use retrieval::{ConversationalRetrievalService, ResponseCache};
pub use splitter::{SegmentMetadata, TextSegment, TextSplitter, TokenCounter, WordCounter};

// Storage and model types that appear in this crate's public API
pub use docrag_db::vector::{EmbeddingRecord, Environment, ScoredMatch, SearchOutcome, VectorMetric};
pub use docrag_model::{DevicePreference, ModelTask, SessionLoader};
