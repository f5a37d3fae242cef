//! Model locator for runtime path resolution.
//!
//! Models are disk assets installed next to the application. The locator
//! never downloads anything.
//!
//! # Search Order
//!
//! 1. **Environment override**: `$DOCRAG_MODELS_DIR` (single path)
//! 2. **User directory**: `~/.docrag/models`
//! 3. **Binary-relative**: `{exe_dir}/models`
//!
//! # Model Layout
//!
//! ```text
//! {models_dir}/
//!   embeddings/
//!     all-MiniLM-L6-v2/
//!       config.json
//!       model.safetensors
//!       tokenizer.json
//!   generators/
//!     flan-t5-base/
//!       config.json
//!       model.safetensors
//!       tokenizer.json
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// Environment variable for overriding the models directory.
pub const DOCRAG_MODELS_DIR_ENV: &str = "DOCRAG_MODELS_DIR";

/// Subdirectory for encoder models.
pub const EMBEDDINGS_SUBDIR: &str = "embeddings";

/// Subdirectory for generator models.
pub const GENERATORS_SUBDIR: &str = "generators";

/// Required files for a valid model directory.
pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "model.safetensors", "tokenizer.json"];

// ============================================================================
// ModelLocator
// ============================================================================

/// Locates model files at runtime using a defined search order.
#[derive(Debug, Clone, Default)]
pub struct ModelLocator {
    /// Fixed base directory; when unset the search order applies.
    base_dir: Option<PathBuf>,
}

impl ModelLocator {
    /// Create a new model locator.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a model locator with a fixed base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Resolve the base models directory.
    ///
    /// Returns the first directory of the search order that exists.
    pub fn resolve_base_dir(&self) -> ModelResult<PathBuf> {
        if let Some(ref base) = self.base_dir {
            if base.is_dir() {
                return Ok(base.clone());
            }
            return Err(ModelError::ModelsDirectoryNotFound {
                searched: vec![base.clone()],
            });
        }

        let mut searched = Vec::new();

        if let Ok(env_path) = env::var(DOCRAG_MODELS_DIR_ENV) {
            let path = PathBuf::from(&env_path);
            if path.is_dir() {
                return Ok(path);
            }
            searched.push(path);
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".docrag").join("models");
            if path.is_dir() {
                return Ok(path);
            }
            searched.push(path);
        }

        if let Ok(exe_path) = env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let path = exe_dir.join("models");
                if path.is_dir() {
                    return Ok(path);
                }
                searched.push(path);
            }
        }

        Err(ModelError::ModelsDirectoryNotFound { searched })
    }

    /// Resolve the directory of a model.
    ///
    /// `model_id` may be a full id (`sentence-transformers/all-MiniLM-L6-v2`)
    /// or a short name. Candidates, in order:
    /// `{base}/{subdir}/{name}`, `{base}/{model_id}`, `{base}/{name}`.
    pub fn model_path(&self, subdir: &str, model_id: &str) -> ModelResult<PathBuf> {
        let base = self.resolve_base_dir()?;
        let model_name = extract_model_name(model_id);

        let candidates = [
            base.join(subdir).join(model_name),
            base.join(model_id),
            base.join(model_name),
        ];

        for path in &candidates {
            if is_valid_model_dir(path) {
                return Ok(path.clone());
            }
        }

        Err(ModelError::ModelNotFound {
            model_id: model_id.to_string(),
            path: candidates[0].clone(),
        })
    }

    /// Resolve the path to an encoder model.
    pub fn embedding_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        self.model_path(EMBEDDINGS_SUBDIR, model_id)
    }

    /// Resolve the path to a generator model.
    pub fn generator_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        self.model_path(GENERATORS_SUBDIR, model_id)
    }

    /// Validate that a model directory contains all required files.
    pub fn validate_model_dir(&self, path: &Path) -> ModelResult<()> {
        if !path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: path.display().to_string(),
                path: path.to_path_buf(),
            });
        }

        let missing: Vec<&'static str> = REQUIRED_MODEL_FILES
            .iter()
            .copied()
            .filter(|file| !path.join(file).exists())
            .collect();

        if !missing.is_empty() {
            return Err(ModelError::IncompleteModelFiles {
                path: path.to_path_buf(),
                missing,
            });
        }

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extract the model name from a full model ID.
///
/// E.g., "sentence-transformers/all-MiniLM-L6-v2" → "all-MiniLM-L6-v2"
pub(crate) fn extract_model_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

/// A directory counts as a model directory once it has a config.json.
fn is_valid_model_dir(path: &Path) -> bool {
    path.is_dir() && path.join("config.json").exists()
}

// ============================================================================
// Tests
// ============================================================================
