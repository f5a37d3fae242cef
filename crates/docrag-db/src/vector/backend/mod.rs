//! Vector store backend implementations.
//!
//! ## Available Backends
//!
//! - `lancedb` (default): LanceDB, local directory or remote URI
//! - `memory`: in-process linear scan

#[cfg(feature = "lancedb")]
mod lancedb;

mod memory;

#[cfg(feature = "lancedb")]
pub use self::lancedb::LanceDbVectorStore;

pub use memory::MemoryVectorStore;

use super::config::{VectorStoreConfig, DEFAULT_BACKEND};
use super::traits::VectorStoreBackend;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::debug;

/// Open a vector store with the given configuration.
///
/// # Errors
///
/// Returns an error if:
/// - The backend is unknown or its feature is disabled
/// - A persistent backend is requested without a URI
pub fn open_vector_store(config: &VectorStoreConfig) -> DbResult<Arc<dyn VectorStoreBackend>> {
    debug!(backend = %config.backend, "Opening vector store");

    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryVectorStore::new())),

        #[cfg(feature = "lancedb")]
        "lancedb" => {
            let uri = config.uri.as_deref().ok_or_else(|| DbError::Config {
                message: "vector store URI is not configured".to_string(),
            })?;
            Ok(Arc::new(LanceDbVectorStore::new(uri, config.api_key.clone())))
        }

        backend if backend == DEFAULT_BACKEND => Err(DbError::Config {
            message: format!(
                "Backend '{}' is not available (feature not enabled)",
                backend
            ),
        }),

        backend => Err(DbError::Config {
            message: format!(
                "Unknown backend: '{}'. Available backends: {}",
                backend,
                available_backends().join(", ")
            ),
        }),
    }
}

/// Get a list of available backend names.
#[allow(clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = Vec::new();

    #[cfg(feature = "lancedb")]
    backends.push("lancedb");

    backends.push("memory");

    backends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_backends_include_memory() {
        assert!(available_backends().contains(&"memory"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let config = VectorStoreConfig::default().with_backend("milvus");
        let err = open_vector_store(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown backend"));
    }

    #[cfg(feature = "lancedb")]
    #[test]
    fn test_lancedb_requires_uri() {
        let config = VectorStoreConfig::default();
        assert!(matches!(open_vector_store(&config), Err(DbError::Config { .. })));
    }
}
