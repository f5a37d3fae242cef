//! Static registry of known models, keyed by task.
//!
//! Each task has exactly one default entry used when the caller does not
//! name a model.

use std::path::Path;

use tracing::debug;

use crate::config::{HuggingFaceModelConfig, ModelDescriptor, ModelTask};
use crate::error::{ModelError, ModelResult};
use crate::model_locator::{extract_model_name, ModelLocator};

/// One row of the registry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub task: ModelTask,
    pub model_id: &'static str,
    pub default: bool,
}

impl RegistryEntry {
    pub fn name(&self) -> &'static str {
        extract_model_name(self.model_id)
    }
}

const KNOWN_MODELS: &[RegistryEntry] = &[
    RegistryEntry {
        task: ModelTask::SimilarityEmbedding,
        model_id: "sentence-transformers/all-MiniLM-L6-v2",
        default: true,
    },
    RegistryEntry {
        task: ModelTask::SimilarityEmbedding,
        model_id: "BAAI/bge-small-en-v1.5",
        default: false,
    },
    RegistryEntry {
        task: ModelTask::SimilarityEmbedding,
        model_id: "intfloat/multilingual-e5-small",
        default: false,
    },
    RegistryEntry {
        task: ModelTask::Summarization,
        model_id: "google/flan-t5-base",
        default: true,
    },
    RegistryEntry {
        task: ModelTask::TextGeneration,
        model_id: "google/flan-t5-base",
        default: true,
    },
    RegistryEntry {
        task: ModelTask::TextGeneration,
        model_id: "google/flan-t5-small",
        default: false,
    },
    RegistryEntry {
        task: ModelTask::DocumentQa,
        model_id: "google/flan-t5-base",
        default: true,
    },
];

/// Resolves `(task, name)` pairs into [`ModelDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    locator: ModelLocator,
    /// Cap applied on top of each model's own context limit.
    max_sequence_length: Option<usize>,
}

impl ModelRegistry {
    pub fn new(locator: ModelLocator) -> Self {
        Self {
            locator,
            max_sequence_length: None,
        }
    }

    pub fn with_max_sequence_length(mut self, max: usize) -> Self {
        self.max_sequence_length = Some(max);
        self
    }

    pub fn locator(&self) -> &ModelLocator {
        &self.locator
    }

    /// All known entries, in table order.
    pub fn entries() -> &'static [RegistryEntry] {
        KNOWN_MODELS
    }

    /// Find the registry entry for a task, by name or the task default.
    pub fn lookup(task: ModelTask, name: Option<&str>) -> ModelResult<RegistryEntry> {
        let found = match name {
            Some(name) => KNOWN_MODELS
                .iter()
                .find(|e| e.task == task && (e.model_id == name || e.name() == name)),
            None => KNOWN_MODELS.iter().find(|e| e.task == task && e.default),
        };

        found.copied().ok_or_else(|| ModelError::UnknownModel {
            task,
            name: name.unwrap_or("<default>").to_string(),
        })
    }

    /// Resolve a descriptor by reading the model's config.json from disk.
    pub fn resolve(&self, task: ModelTask, name: Option<&str>) -> ModelResult<ModelDescriptor> {
        let entry = Self::lookup(task, name)?;
        let root = self.locator.model_path(task.models_subdir(), entry.model_id)?;
        self.locator.validate_model_dir(&root)?;

        let hf_config = read_hf_config(&root)?;
        let model_limit = hf_config.max_position_embeddings;
        let max_context_length = self
            .max_sequence_length
            .map_or(model_limit, |cap| cap.min(model_limit));

        debug!(
            task = %task,
            model = entry.model_id,
            root = %root.display(),
            "Resolved model descriptor"
        );

        Ok(ModelDescriptor {
            name: entry.name().to_string(),
            model_id: entry.model_id.to_string(),
            task,
            weights_path: root.join("model.safetensors"),
            tokenizer_path: root.join("tokenizer.json"),
            dimension: hf_config.hidden_size,
            max_context_length,
            vocab_size: hf_config.vocab_size,
            architecture: hf_config.infer_architecture(),
            root,
        })
    }
}

fn read_hf_config(root: &Path) -> ModelResult<HuggingFaceModelConfig> {
    let content = std::fs::read_to_string(root.join("config.json"))?;
    serde_json::from_str(&content).map_err(|e| ModelError::InvalidConfig {
        message: format!("{}: {}", root.display(), e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelArchitecture;
    use crate::model_locator::REQUIRED_MODEL_FILES;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_every_task_has_one_default() {
        for task in ModelTask::ALL {
            let defaults = KNOWN_MODELS
                .iter()
                .filter(|e| e.task == task && e.default)
                .count();
            assert_eq!(defaults, 1, "task {task}");
        }
    }

    #[test]
    fn test_lookup_by_short_and_full_name() {
        let short = ModelRegistry::lookup(ModelTask::SimilarityEmbedding, Some("bge-small-en-v1.5"))
            .unwrap();
        let full =
            ModelRegistry::lookup(ModelTask::SimilarityEmbedding, Some("BAAI/bge-small-en-v1.5"))
                .unwrap();
        assert_eq!(short, full);

        let default = ModelRegistry::lookup(ModelTask::SimilarityEmbedding, None).unwrap();
        assert_eq!(default.name(), "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_lookup_unknown_name() {
        let err = ModelRegistry::lookup(ModelTask::Summarization, Some("all-MiniLM-L6-v2"))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownModel { .. }));
    }

    #[test]
    fn test_resolve_reads_config() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("embeddings").join("all-MiniLM-L6-v2");
        fs::create_dir_all(&dir).unwrap();
        for file in REQUIRED_MODEL_FILES {
            fs::write(dir.join(file), "{}").unwrap();
        }
        fs::write(
            dir.join("config.json"),
            r#"{"architectures":["BertModel"],"hidden_size":384,"max_position_embeddings":512,"vocab_size":30522}"#,
        )
        .unwrap();

        let registry =
            ModelRegistry::new(ModelLocator::with_base_dir(temp.path())).with_max_sequence_length(256);
        let descriptor = registry.resolve(ModelTask::SimilarityEmbedding, None).unwrap();

        assert_eq!(descriptor.name, "all-MiniLM-L6-v2");
        assert_eq!(descriptor.dimension, 384);
        assert_eq!(descriptor.max_context_length, 256);
        assert_eq!(descriptor.vocab_size, 30522);
        assert_eq!(descriptor.architecture, ModelArchitecture::Bert);
        assert_eq!(descriptor.tokenizer_path, dir.join("tokenizer.json"));
    }

    #[test]
    fn test_resolve_missing_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("generators").join("flan-t5-base");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.json"), "{}").unwrap();

        let registry = ModelRegistry::new(ModelLocator::with_base_dir(temp.path()));
        let err = registry.resolve(ModelTask::TextGeneration, None).unwrap_err();
        assert!(err.is_missing_model());
    }
}
