//! Configuration for the docrag engine.
//!
//! [`AppConfig`] is read from YAML and then patched with environment
//! overrides. Every section has defaults so docrag works without a config
//! file; settings for external services left unset disable those services
//! instead of failing startup.
//!
//! # Example
//!
//! ```yaml
//! models:
//!   dir: /opt/docrag/models
//!   device: cpu
//!   embeddingModel: all-MiniLM-L6-v2
//! vectorStore:
//!   uri: /var/lib/docrag/vectors
//!   similarityThreshold: 0.5
//! extraction:
//!   unstructuredUrl: http://localhost:8000/general/v0/general
//!   chunkSize: 4096
//! environment: production
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use docrag_db::vector::{Environment, VectorStoreConfig};
use docrag_model::{DevicePreference, ModelTask, SessionConfig, DEFAULT_TOKENIZE_BATCH_SIZE};
use serde::{Deserialize, Serialize};

use crate::errors::{DocragError, DocragResult};

/// Environment variable pointing at an explicit config file.
pub const DOCRAG_CONFIG_ENV: &str = "DOCRAG_CONFIG";

/// Default chunk size in tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default overlap between adjacent chunks in tokens.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Files above this size use fast extraction (20 MB).
pub const DEFAULT_LARGE_FILE_THRESHOLD: u64 = 20 * 1024 * 1024;

// ============================================================================
// AppConfig
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub models: ModelsSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub extraction: ExtractionSection,

    #[serde(default)]
    pub retrieval: RetrievalSection,

    /// Deployment environment; production refuses destructive store operations.
    #[serde(default)]
    pub environment: Environment,
}

impl AppConfig {
    /// Load configuration: `explicit` path, then `$DOCRAG_CONFIG`, then
    /// `~/.docrag/config.yaml`. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns [`DocragError::Configuration`] if a file exists but cannot be
    /// parsed, or if validation fails.
    pub fn load(explicit: Option<&Path>) -> DocragResult<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(DOCRAG_CONFIG_ENV).map(PathBuf::from))
            .or_else(Self::default_path);

        let mut config = match path {
            Some(path) => Self::from_path(&path)?,
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());

        for warning in config.validate()? {
            tracing::warn!("Config warning: {}", warning);
        }
        Ok(config)
    }

    /// Read a YAML file. A missing file yields the defaults.
    pub fn from_path(path: &Path) -> DocragResult<Self> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            DocragError::configuration(
                format!("Failed to read {}: {}", path.display(), e),
                "Check the file permissions",
            )
        })?;

        serde_yaml::from_str(&content).map_err(|e| {
            DocragError::configuration(
                format!("Failed to parse {}: {}", path.display(), e),
                "Fix the YAML syntax or remove the file to use defaults",
            )
        })
    }

    /// Default config directory (`~/.docrag`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".docrag"))
    }

    /// Default config file path (`~/.docrag/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join("config.yaml"))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DOCRAG_MODELS_DIR") {
            self.models.dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get("DOCRAG_UPLOAD_DIR") {
            self.storage.upload_dir = Some(PathBuf::from(dir));
        }
        if let Some(uri) = get("DOCRAG_VECTOR_URI") {
            self.vector_store.uri = Some(uri);
        }
        if let Some(key) = get("DOCRAG_VECTOR_API_KEY") {
            self.vector_store.api_key = Some(key);
        }
        if let Some(url) = get("UNSTRUCTURED_API_URL") {
            self.extraction.unstructured_url = Some(url);
        }
        if let Some(key) = get("UNSTRUCTURED_API_KEY") {
            self.extraction.unstructured_api_key = Some(key);
        }
        if let Some(env) = get("DOCRAG_ENV") {
            match env.parse() {
                Ok(env) => self.environment = env,
                Err(e) => tracing::warn!("Ignoring DOCRAG_ENV: {}", e),
            }
        }
        if let Some(device) = get("DOCRAG_DEVICE") {
            match device.parse::<DevicePreference>() {
                Ok(device) => self.models.session.device = device,
                Err(e) => tracing::warn!("Ignoring DOCRAG_DEVICE: {}", e),
            }
        }
    }

    /// Validate the configuration, returning warnings for questionable values.
    ///
    /// # Errors
    ///
    /// Returns an error for values that would break the pipeline
    /// (zero batch or chunk size, overlap not smaller than the chunk).
    pub fn validate(&self) -> DocragResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.models.embedding_batch_size == 0 {
            return Err(DocragError::configuration(
                "models.embeddingBatchSize cannot be 0",
                "Set embeddingBatchSize to at least 1 (recommended: 16-64)",
            ));
        }
        if self.extraction.chunk_size == 0 {
            return Err(DocragError::configuration(
                "extraction.chunkSize cannot be 0",
                "Set chunkSize to a positive token count",
            ));
        }
        if self.extraction.chunk_overlap >= self.extraction.chunk_size {
            return Err(DocragError::configuration(
                format!(
                    "extraction.chunkOverlap ({}) must be smaller than chunkSize ({})",
                    self.extraction.chunk_overlap, self.extraction.chunk_size
                ),
                "Lower chunkOverlap",
            ));
        }
        if !matches!(
            self.retrieval.answer_task,
            ModelTask::TextGeneration | ModelTask::DocumentQa
        ) {
            return Err(DocragError::configuration(
                format!("retrieval.answerTask cannot be {}", self.retrieval.answer_task),
                "Use text-generation or document-qa",
            ));
        }
        if self.vector_store.search_limit == 0 {
            return Err(DocragError::configuration(
                "vectorStore.searchLimit cannot be 0",
                "Set searchLimit to at least 1",
            ));
        }

        if self.models.embedding_batch_size > 512 {
            warnings.push(format!(
                "models.embeddingBatchSize={} is very large; may cause OOM on constrained devices",
                self.models.embedding_batch_size
            ));
        }
        if !(-1.0..=1.0).contains(&self.vector_store.similarity_threshold) {
            warnings.push(format!(
                "vectorStore.similarityThreshold={} is outside [-1, 1]; nothing or everything will match",
                self.vector_store.similarity_threshold
            ));
        }
        if self.environment == Environment::Production && self.vector_store.backend == "memory" {
            warnings.push("vectorStore.backend=memory loses every collection on exit".to_string());
        }

        Ok(warnings)
    }

    /// Session settings for the model layer.
    pub fn session_config(&self) -> SessionConfig {
        self.models.session.clone()
    }

    /// Vector store settings with the deployment environment and a default
    /// local URI filled in.
    pub fn vector_store_config(&self) -> VectorStoreConfig {
        let mut config = self.vector_store.clone();
        config.environment = self.environment;
        if config.uri.is_none() && config.backend == docrag_db::vector::DEFAULT_BACKEND {
            config.uri = Self::default_dir()
                .map(|d| d.join("vectors").to_string_lossy().into_owned());
        }
        config
    }

    /// Directory holding uploaded files and the local document index.
    pub fn upload_dir(&self) -> Option<PathBuf> {
        self.storage
            .upload_dir
            .clone()
            .or_else(|| Self::default_dir().map(|d| d.join("uploads")))
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Model selection and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsSection {
    /// Models root; unset uses the locator search order.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Encoder name; unset uses the registry default.
    #[serde(default)]
    pub embedding_model: Option<String>,

    #[serde(default)]
    pub generation_model: Option<String>,

    #[serde(default)]
    pub summarization_model: Option<String>,

    /// Texts per encoder call.
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    #[serde(flatten)]
    pub session: SessionConfig,
}

fn default_embedding_batch_size() -> usize {
    DEFAULT_TOKENIZE_BATCH_SIZE
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            dir: None,
            embedding_model: None,
            generation_model: None,
            summarization_model: None,
            embedding_batch_size: default_embedding_batch_size(),
            session: SessionConfig::default(),
        }
    }
}

/// Local storage locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSection {
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

/// Document extraction and splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSection {
    /// Layout extraction endpoint; unset disables it.
    #[serde(default)]
    pub unstructured_url: Option<String>,

    #[serde(default)]
    pub unstructured_api_key: Option<String>,

    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    /// Target chunk size in tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Upper bound on parsing one document.
    #[serde(default = "default_parse_timeout_secs")]
    pub parse_timeout_secs: u64,

    /// Per-request limit for the extraction service.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Replace the first-paragraph description with a generated summary.
    #[serde(default)]
    pub summarize_description: bool,
}

fn default_large_file_threshold() -> u64 {
    DEFAULT_LARGE_FILE_THRESHOLD
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_parse_timeout_secs() -> u64 {
    3 * 60 * 60
}

fn default_request_timeout_secs() -> u64 {
    30 * 60
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            unstructured_url: None,
            unstructured_api_key: None,
            large_file_threshold: default_large_file_threshold(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            parse_timeout_secs: default_parse_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            summarize_description: false,
        }
    }
}

/// Question answering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalSection {
    /// Cached answers kept at most.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Generation budget per answer.
    #[serde(default = "default_max_answer_tokens")]
    pub max_answer_tokens: usize,

    /// Session answering questions: `text-generation` or `document-qa`.
    #[serde(default = "default_answer_task")]
    pub answer_task: ModelTask,
}

fn default_cache_capacity() -> u64 {
    512
}

fn default_cache_ttl_secs() -> u64 {
    10 * 60
}

fn default_max_answer_tokens() -> usize {
    256
}

fn default_answer_task() -> ModelTask {
    ModelTask::TextGeneration
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_answer_tokens: default_max_answer_tokens(),
            answer_task: default_answer_task(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.extraction.chunk_size, 4096);
        assert_eq!(config.extraction.chunk_overlap, 200);
        assert_eq!(config.retrieval.cache_capacity, 512);
        assert_eq!(config.retrieval.cache_ttl_secs, 600);
        assert_eq!(config.models.session.session_capacity, 3);
        assert_eq!(config.vector_store.search_limit, 5);
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_path(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_yaml_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
models:
  embeddingModel: bge-small-en-v1.5
  sessionCapacity: 1
  device: cpu
vectorStore:
  backend: memory
  metric: cosine
extraction:
  chunkSize: 256
  chunkOverlap: 16
environment: production
"#,
        )
        .unwrap();

        let config = AppConfig::from_path(&path).unwrap();
        assert_eq!(config.models.embedding_model.as_deref(), Some("bge-small-en-v1.5"));
        assert_eq!(config.models.session.session_capacity, 1);
        assert_eq!(config.models.session.device, DevicePreference::Cpu);
        assert_eq!(config.vector_store.backend, "memory");
        assert_eq!(config.extraction.chunk_size, 256);
        assert_eq!(config.vector_store_config().environment, Environment::Production);
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "models: [unterminated").unwrap();

        let err = AppConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, DocragError::Configuration { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DOCRAG_MODELS_DIR", "/models"),
            ("DOCRAG_VECTOR_URI", "db://docs"),
            ("UNSTRUCTURED_API_URL", "http://extract"),
            ("DOCRAG_ENV", "production"),
            ("DOCRAG_DEVICE", "cpu"),
            ("DOCRAG_VECTOR_API_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.models.dir, Some(PathBuf::from("/models")));
        assert_eq!(config.vector_store.uri.as_deref(), Some("db://docs"));
        assert_eq!(config.extraction.unstructured_url.as_deref(), Some("http://extract"));
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.models.session.device, DevicePreference::Cpu);
        assert_eq!(config.vector_store.api_key, None);
    }

    #[test]
    fn test_validation_rejects_bad_chunking() {
        let mut config = AppConfig::default();
        config.extraction.chunk_overlap = config.extraction.chunk_size;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.models.embedding_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_answer_task_setting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "retrieval:\n  answerTask: document-qa\n").unwrap();

        let config = AppConfig::from_path(&path).unwrap();
        assert_eq!(config.retrieval.answer_task, ModelTask::DocumentQa);
        assert!(config.validate().is_ok());
        assert_eq!(AppConfig::default().retrieval.answer_task, ModelTask::TextGeneration);

        let mut config = AppConfig::default();
        config.retrieval.answer_task = ModelTask::SimilarityEmbedding;
        assert!(config.validate().is_err());
    }
}
