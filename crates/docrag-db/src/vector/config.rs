//! Vector store configuration and collection naming.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::VectorMetric;
use crate::error::{DbError, DbResult};

/// Default backend name.
pub const DEFAULT_BACKEND: &str = "lancedb";

/// Namespace prefix of every collection name.
pub const COLLECTION_PREFIX: &str = "DOCRAG_";

/// Longest text stored per record, in characters.
pub const TEXT_MAX_CHARS: usize = 8192;

// ============================================================================
// Environment
// ============================================================================

/// Deployment environment. Production refuses to drop collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn allows_drop(self) -> bool {
        !matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!("Unknown environment: '{}'", s)),
        }
    }
}

// ============================================================================
// VectorStoreConfig
// ============================================================================

/// Configuration for the vector store connection and searches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreConfig {
    /// Backend name: `lancedb` or `memory`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Local directory or remote `db://` URI. `None` leaves the store unconfigured.
    #[serde(default)]
    pub uri: Option<String>,

    /// Credential for remote stores.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub metric: VectorMetric,

    /// Matches retrieved per question.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Minimum similarity for a match to be used as context.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Limit on a single health probe.
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,

    #[serde(default)]
    pub environment: Environment,
}

fn default_backend() -> String {
    DEFAULT_BACKEND.to_string()
}

fn default_search_limit() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.5
}

fn default_health_timeout_secs() -> u64 {
    5
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            uri: None,
            api_key: None,
            metric: VectorMetric::default(),
            search_limit: default_search_limit(),
            similarity_threshold: default_similarity_threshold(),
            health_timeout_secs: default_health_timeout_secs(),
            environment: Environment::default(),
        }
    }
}

impl VectorStoreConfig {
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

// ============================================================================
// Collection naming
// ============================================================================

/// Collection name for a document: the prefix plus the uppercased content hash.
///
/// Identical content always maps to the same collection.
pub fn collection_name(content_hash: &str) -> DbResult<String> {
    if content_hash.is_empty() {
        return Err(DbError::InvalidCollectionName {
            name: content_hash.to_string(),
            reason: "content hash is empty".to_string(),
        });
    }
    if !content_hash.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DbError::InvalidCollectionName {
            name: content_hash.to_string(),
            reason: "content hash must be ASCII alphanumeric".to_string(),
        });
    }
    Ok(format!("{COLLECTION_PREFIX}{}", content_hash.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_is_deterministic() {
        let a = collection_name("ab12cd").unwrap();
        let b = collection_name("AB12CD").unwrap();
        assert_eq!(a, "DOCRAG_AB12CD");
        assert_eq!(a, b);
    }

    #[test]
    fn test_collection_name_rejects_bad_hashes() {
        assert!(collection_name("").is_err());
        assert!(collection_name("../etc").is_err());
        assert!(collection_name("ab-12").is_err());
    }

    #[test]
    fn test_environment_policy() {
        assert!(Environment::Development.allows_drop());
        assert!(Environment::Test.allows_drop());
        assert!(!Environment::Production.allows_drop());
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
    }

    #[test]
    fn test_config_defaults_from_yaml_like_json() {
        let config: VectorStoreConfig = serde_json::from_str(r#"{"uri":"/tmp/v"}"#).unwrap();
        assert_eq!(config.backend, "lancedb");
        assert_eq!(config.metric, VectorMetric::L2);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.uri.as_deref(), Some("/tmp/v"));
    }
}
