//! Vector collection management.
//!
//! ## Available Backends
//!
//! - `lancedb` (default): LanceDB, local or remote
//! - `memory`: linear-scan store for tests and throwaway runs
//!
//! ## Usage
//!
//! ```ignore
//! use docrag_db::vector::{open_vector_store, VectorStoreConfig, VectorStoreGateway};
//!
//! let config = VectorStoreConfig::default();
//! let gateway = VectorStoreGateway::new(open_vector_store(&config)?, config.environment);
//!
//! let name = collection_name(&content_hash)?;
//! if gateway.ensure_collection(&name, 384).await {
//!     gateway.insert(&name, &records).await;
//! }
//! ```

mod backend;
mod config;
mod gateway;
mod traits;

pub use config::{
    collection_name, Environment, VectorStoreConfig, COLLECTION_PREFIX, DEFAULT_BACKEND,
    TEXT_MAX_CHARS,
};
pub use gateway::{SearchOutcome, VectorStoreGateway};
pub use traits::{EmbeddingRecord, OutputField, ScoredMatch, VectorMetric, VectorStoreBackend};

pub use backend::{available_backends, open_vector_store, MemoryVectorStore};

#[cfg(feature = "lancedb")]
pub use backend::LanceDbVectorStore;
