//! # docrag-db
//!
//! Storage layer for docrag: one vector collection per ingested document.
//!
//! Keeping the vector database behind this crate means `docrag-core` only
//! sees the [`vector::VectorStoreGateway`] contract, and backends can be swapped
//! without touching ingestion or retrieval.
//!
//! ## Architecture
//!
//! ```text
//! docrag-cli → docrag-core → docrag-db (gateway + backends)
//!                          → docrag-model (tokenizer, encoder, generator)
//! ```
//!
//! ## Features
//!
//! - `lancedb` (default): LanceDB backend (local directory or `db://` URI)
//! - `remote`: API-key authenticated LanceDB Cloud connections
//!
//! The in-memory backend is always available.

pub mod error;
pub mod vector;

pub use error::{DbError, DbResult};
