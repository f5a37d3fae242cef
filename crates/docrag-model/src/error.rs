//! Error types for docrag-model.
//!
//! Errors explain what went wrong, where model files were expected and how
//! to fix the installation. Inference failures carry the task and input size
//! so they can be diagnosed from logs alone.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ModelTask;

/// Result type alias for docrag-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in docrag-model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    // ========================================================================
    // Model discovery errors
    // ========================================================================
    /// No models directory found in any search location.
    #[error("{}", format_models_dir_not_found(.searched))]
    ModelsDirectoryNotFound { searched: Vec<PathBuf> },

    /// Model files not found at expected location.
    #[error("{}", format_model_not_found(.model_id, .path))]
    ModelNotFound { model_id: String, path: PathBuf },

    /// Model directory exists but is missing required files.
    #[error("{}", format_incomplete_model(.path, .missing))]
    IncompleteModelFiles {
        path: PathBuf,
        missing: Vec<&'static str>,
    },

    /// No registry entry for the requested (task, name) pair.
    #[error("Unknown model '{name}' for task '{task}'. Run `docrag models` to list known models.")]
    UnknownModel { task: ModelTask, name: String },

    // ========================================================================
    // Construction errors
    // ========================================================================
    /// Required path or setting is missing or invalid.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Tokenizer definition could not be loaded.
    #[error("Failed to load tokenizer from {}: {message}", .path.display())]
    TokenizerLoad { path: PathBuf, message: String },

    /// Failed to load model weights.
    #[error("Failed to load model '{model_id}': {message}")]
    ModelLoad { model_id: String, message: String },

    /// Model configuration invalid or corrupted.
    #[error("Invalid model configuration: {message}\n\nThe model's config.json may be corrupted or incompatible.\nTry re-downloading the model from Hugging Face.")]
    InvalidConfig { message: String },

    /// Loading a session took longer than the configured limit.
    #[error("Loading the {task} model timed out after {secs}s")]
    LoadTimeout { task: ModelTask, secs: u64 },

    /// A session could not be produced for a task.
    #[error("No {task} model available: {reason}")]
    SessionUnavailable { task: ModelTask, reason: String },

    // ========================================================================
    // Inference errors
    // ========================================================================
    /// Caller passed input the tokenizer refuses (empty text, empty batch).
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Tokenization failed.
    #[error("Tokenization failed: {message}")]
    Tokenization { message: String },

    /// Model execution failed.
    #[error("Inference failed for {task} model '{model_id}' ({input_len} inputs): {message}")]
    Inference {
        task: ModelTask,
        model_id: String,
        input_len: usize,
        message: String,
    },

    /// The session does not expose the requested engine.
    #[error("Model '{model_id}' cannot be used for {requested}")]
    WrongEngine { model_id: String, requested: &'static str },

    /// Device not available.
    #[error("Compute device not available: {reason}\n\nGPU acceleration was requested but is not available.\nSet models.device to 'cpu' in ~/.docrag/config.yaml to use CPU-only inference.")]
    DeviceNotAvailable { reason: String },

    // ========================================================================
    // I/O errors
    // ========================================================================
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error message formatters
// ============================================================================

fn format_models_dir_not_found(searched: &[PathBuf]) -> String {
    let list = searched
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {}", i + 1, p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Models directory not found.\n\n\
        docrag searched these locations:\n\
        {list}\n\n\
        To fix:\n\
        1. Set $DOCRAG_MODELS_DIR to your models directory, OR\n\
        2. Copy models to ~/.docrag/models/, OR\n\
        3. Ensure models/ exists next to the docrag binary."
    )
}

fn format_model_not_found(model_id: &str, path: &std::path::Path) -> String {
    format!(
        "Model not found: {model_id}\n\n\
        Expected at: {}\n\n\
        Ensure the model directory exists and contains config.json,\n\
        model.safetensors, and tokenizer.json.",
        path.display()
    )
}

fn format_incomplete_model(path: &std::path::Path, missing: &[&str]) -> String {
    let missing_list = missing.join(", ");
    format!(
        "Incomplete model installation at {}\n\n\
        Missing files: {missing_list}\n\n\
        A complete model directory must contain:\n\
        - config.json (model configuration)\n\
        - model.safetensors (model weights)\n\
        - tokenizer.json (tokenizer definition)",
        path.display()
    )
}

// ============================================================================
// Error constructors
// ============================================================================

impl ModelError {
    /// Create a model load error.
    pub fn model_load(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Create a tokenizer load error.
    pub fn tokenizer_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TokenizerLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an inference error.
    pub fn inference(
        task: ModelTask,
        model_id: impl Into<String>,
        input_len: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Inference {
            task,
            model_id: model_id.into(),
            input_len,
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a tokenization error.
    pub fn tokenization(message: impl Into<String>) -> Self {
        Self::Tokenization {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error means model files are absent rather than broken.
    pub fn is_missing_model(&self) -> bool {
        matches!(
            self,
            Self::ModelsDirectoryNotFound { .. }
                | Self::ModelNotFound { .. }
                | Self::IncompleteModelFiles { .. }
        )
    }
}
