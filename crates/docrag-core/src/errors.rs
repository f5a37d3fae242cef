//! Error types for docrag-core.

use std::path::PathBuf;

use docrag_db::DbError;
use docrag_model::ModelError;
use thiserror::Error;

/// Result type alias for docrag-core operations.
pub type DocragResult<T> = Result<T, DocragError>;

/// Domain-specific errors for docrag operations.
#[derive(Error, Debug)]
pub enum DocragError {
    /// A required path, credential or setting is missing or invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    Configuration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// Document parsing or extraction failed.
    #[error("Failed to load {}: {message}", .path.display())]
    Load { path: PathBuf, message: String },

    /// The file extension is not one the loader understands.
    #[error("Unsupported file type `{0}`.")]
    UnsupportedFileType(String),

    /// The generic extractor is needed for this format but not configured.
    #[error("`{0}` files need the layout extraction service. Set UNSTRUCTURED_API_URL.")]
    ExtractorUnavailable(String),

    /// Tokenization or model execution failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// No model session could be opened for a task.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Vector store unreachable or refused an operation.
    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// A vector does not fit the collection it targets.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A bounded operation ran past its limit.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Invalid argument provided by the caller.
    #[error("{0}")]
    InvalidArgument(String),

    /// I/O error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error wrapper.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DocragError {
    /// Create a load error for `path`.
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error with a hint.
    pub fn configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Map a model-layer error onto the core taxonomy.
    pub fn from_model_error(err: ModelError) -> Self {
        match err {
            ModelError::Configuration { message } => Self::Configuration {
                message,
                hint: "Check the `models` section of config.yaml".to_string(),
            },
            ModelError::ModelsDirectoryNotFound { .. }
            | ModelError::ModelNotFound { .. }
            | ModelError::IncompleteModelFiles { .. }
            | ModelError::UnknownModel { .. }
            | ModelError::TokenizerLoad { .. }
            | ModelError::ModelLoad { .. }
            | ModelError::InvalidConfig { .. }
            | ModelError::LoadTimeout { .. }
            | ModelError::SessionUnavailable { .. }
            | ModelError::DeviceNotAvailable { .. } => Self::ModelUnavailable(err.to_string()),
            ModelError::InvalidInput { message } => Self::InvalidArgument(message),
            ModelError::Io(e) => Self::Io(e),
            other => Self::Inference(other.to_string()),
        }
    }

    /// Map a storage-layer error onto the core taxonomy.
    pub fn from_db_error(err: DbError) -> Self {
        match err {
            DbError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            DbError::Config { message } => Self::Configuration {
                message,
                hint: "Check the `vectorStore` section of config.yaml".to_string(),
            },
            DbError::Json(e) => Self::Json(e),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }

    /// Short machine-readable kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Load { .. } | Self::UnsupportedFileType(_) | Self::ExtractorUnavailable(_) => {
                "load"
            }
            Self::Inference(_) => "inference",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::StoreUnavailable(_) | Self::DimensionMismatch { .. } => "store_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => "io",
        }
    }
}

impl From<ModelError> for DocragError {
    fn from(err: ModelError) -> Self {
        Self::from_model_error(err)
    }
}

impl From<DbError> for DocragError {
    fn from(err: DbError) -> Self {
        Self::from_db_error(err)
    }
}
