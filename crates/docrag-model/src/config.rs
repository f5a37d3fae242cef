//! Configuration and descriptor types for docrag-model.
//!
//! These types are the single source of truth for model settings; other
//! crates re-export them rather than defining duplicates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// DevicePreference
// ============================================================================

/// Preference for compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Auto-select best device (GPU if available, else CPU).
    #[default]
    Auto,
    /// Force GPU (Metal on macOS, CUDA on Linux).
    Gpu,
    /// Force CPU only.
    Cpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" | "metal" | "cuda" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(format!(
                "Unknown device: '{}'. Use 'auto', 'gpu', or 'cpu'.",
                s
            )),
        }
    }
}

// ============================================================================
// ModelTask
// ============================================================================

/// Kind of work a model performs. Sessions are cached per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelTask {
    SimilarityEmbedding,
    Summarization,
    TextGeneration,
    DocumentQa,
}

impl ModelTask {
    pub const ALL: [ModelTask; 4] = [
        ModelTask::SimilarityEmbedding,
        ModelTask::Summarization,
        ModelTask::TextGeneration,
        ModelTask::DocumentQa,
    ];

    /// Whether the task is served by an encoder (vs a generator).
    pub fn is_encoder(self) -> bool {
        matches!(self, ModelTask::SimilarityEmbedding)
    }

    /// Subdirectory of the models directory holding this task's models.
    pub fn models_subdir(self) -> &'static str {
        if self.is_encoder() {
            crate::model_locator::EMBEDDINGS_SUBDIR
        } else {
            crate::model_locator::GENERATORS_SUBDIR
        }
    }
}

impl std::fmt::Display for ModelTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SimilarityEmbedding => write!(f, "similarity-embedding"),
            Self::Summarization => write!(f, "summarization"),
            Self::TextGeneration => write!(f, "text-generation"),
            Self::DocumentQa => write!(f, "document-qa"),
        }
    }
}

impl std::str::FromStr for ModelTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "similarity-embedding" | "embedding" | "feature-extraction" => {
                Ok(Self::SimilarityEmbedding)
            }
            "summarization" => Ok(Self::Summarization),
            "text-generation" | "text2text-generation" => Ok(Self::TextGeneration),
            "document-qa" | "question-answering" => Ok(Self::DocumentQa),
            _ => Err(format!("Unknown model task: '{}'", s)),
        }
    }
}

// ============================================================================
// ModelArchitecture
// ============================================================================

/// Model architecture type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelArchitecture {
    #[default]
    Bert,
    Roberta,
    T5,
    Unknown,
}

impl std::fmt::Display for ModelArchitecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bert => write!(f, "bert"),
            Self::Roberta => write!(f, "roberta"),
            Self::T5 => write!(f, "t5"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// HuggingFaceModelConfig
// ============================================================================

/// Config.json structure from HuggingFace models.
///
/// Encoder configs use `hidden_size`/`max_position_embeddings`; T5 configs
/// use `d_model`/`n_positions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceModelConfig {
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default, alias = "d_model")]
    pub hidden_size: usize,
    #[serde(default = "default_max_position", alias = "n_positions")]
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub vocab_size: usize,
    #[serde(default)]
    pub model_type: String,
}

fn default_max_position() -> usize {
    512
}

impl HuggingFaceModelConfig {
    /// Infer architecture from config.
    pub fn infer_architecture(&self) -> ModelArchitecture {
        for arch in &self.architectures {
            let lower = arch.to_lowercase();
            if lower.contains("t5") {
                return ModelArchitecture::T5;
            }
            if lower.contains("roberta") {
                return ModelArchitecture::Roberta;
            }
            if lower.contains("bert") {
                return ModelArchitecture::Bert;
            }
        }

        match self.model_type.to_lowercase().as_str() {
            "bert" => ModelArchitecture::Bert,
            "roberta" | "xlm-roberta" => ModelArchitecture::Roberta,
            "t5" | "mt5" => ModelArchitecture::T5,
            _ => ModelArchitecture::Unknown,
        }
    }
}

// ============================================================================
// ModelDescriptor
// ============================================================================

/// A resolved model: where its files are and what shape its outputs have.
///
/// Immutable once resolved by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Short symbolic name, e.g. `all-MiniLM-L6-v2`.
    pub name: String,
    /// Full HuggingFace identifier.
    pub model_id: String,
    pub task: ModelTask,
    pub root: PathBuf,
    pub weights_path: PathBuf,
    pub tokenizer_path: PathBuf,
    /// Output vector dimension (hidden size for generators).
    pub dimension: usize,
    /// Maximum number of tokens accepted per input.
    pub max_context_length: usize,
    pub vocab_size: usize,
    pub architecture: ModelArchitecture,
}

// ============================================================================
// SessionConfig
// ============================================================================

/// Settings for model sessions and their caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Device preference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Upper bound on tokens per input, applied on top of the model limit.
    #[serde(default = "default_max_seq_len")]
    pub max_sequence_length: usize,

    /// Maximum number of resident sessions.
    #[serde(default = "default_session_capacity")]
    pub session_capacity: u64,

    /// Idle time after which a session is closed.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Limit on a single session load.
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,

    /// Per-tokenizer cache size (entries).
    #[serde(default = "default_tokenizer_cache")]
    pub tokenizer_cache_capacity: u64,
}

fn default_max_seq_len() -> usize {
    512
}

fn default_session_capacity() -> u64 {
    3
}

fn default_session_idle_secs() -> u64 {
    15 * 60
}

fn default_load_timeout_secs() -> u64 {
    10 * 60
}

fn default_tokenizer_cache() -> u64 {
    10_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: DevicePreference::default(),
            max_sequence_length: default_max_seq_len(),
            session_capacity: default_session_capacity(),
            session_idle_secs: default_session_idle_secs(),
            load_timeout_secs: default_load_timeout_secs(),
            tokenizer_cache_capacity: default_tokenizer_cache(),
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.session_capacity = capacity;
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!(
            "auto".parse::<DevicePreference>().unwrap(),
            DevicePreference::Auto
        );
        assert_eq!(
            "cuda".parse::<DevicePreference>().unwrap(),
            DevicePreference::Gpu
        );
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_task_round_trip_names() {
        for task in ModelTask::ALL {
            assert_eq!(task.to_string().parse::<ModelTask>().unwrap(), task);
        }
        assert_eq!(
            "question_answering".parse::<ModelTask>().unwrap(),
            ModelTask::DocumentQa
        );
    }

    #[test]
    fn test_task_subdirs() {
        assert_eq!(ModelTask::SimilarityEmbedding.models_subdir(), "embeddings");
        assert_eq!(ModelTask::Summarization.models_subdir(), "generators");
    }

    #[test]
    fn test_hf_config_reads_t5_fields() {
        let json = r#"{"architectures":["T5ForConditionalGeneration"],"d_model":768,"vocab_size":32128,"model_type":"t5"}"#;
        let config: HuggingFaceModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.hidden_size, 768);
        assert_eq!(config.max_position_embeddings, 512);
        assert_eq!(config.vocab_size, 32128);
        assert_eq!(config.infer_architecture(), ModelArchitecture::T5);
    }

    #[test]
    fn test_hf_config_infer_architecture() {
        let config = HuggingFaceModelConfig {
            architectures: vec!["BertModel".to_string()],
            hidden_size: 384,
            max_position_embeddings: 512,
            vocab_size: 30522,
            model_type: "bert".to_string(),
        };
        assert_eq!(config.infer_architecture(), ModelArchitecture::Bert);

        let roberta = HuggingFaceModelConfig {
            architectures: vec!["XLMRobertaModel".to_string()],
            model_type: "xlm-roberta".to_string(),
            ..config.clone()
        };
        assert_eq!(roberta.infer_architecture(), ModelArchitecture::Roberta);
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.session_capacity, 3);
        assert_eq!(config.idle_ttl(), Duration::from_secs(900));
    }
}
