//! Integration tests for ModelLocator and ModelRegistry resolution through
//! the environment override.

use docrag_model::{
    ModelError, ModelLocator, ModelRegistry, ModelTask, DOCRAG_MODELS_DIR_ENV, EMBEDDINGS_SUBDIR,
    GENERATORS_SUBDIR, REQUIRED_MODEL_FILES,
};
use std::env;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

// Mutex to prevent concurrent env var modifications in tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn setup_mock_model(temp: &TempDir, subdir: &str, model_name: &str) -> std::path::PathBuf {
    let model_path = temp.path().join(subdir).join(model_name);
    fs::create_dir_all(&model_path).expect("Failed to create model directory");

    for file in REQUIRED_MODEL_FILES {
        let content = match *file {
            "config.json" => r#"{"hidden_size": 384, "max_position_embeddings": 512}"#,
            "tokenizer.json" => r#"{"version": "1.0"}"#,
            _ => "{}",
        };
        fs::write(model_path.join(file), content).expect("Failed to write model file");
    }

    model_path
}

#[test]
fn test_env_var_takes_precedence() {
    let _guard = ENV_MUTEX.lock().unwrap();

    let temp = TempDir::new().unwrap();
    setup_mock_model(&temp, EMBEDDINGS_SUBDIR, "all-MiniLM-L6-v2");
    env::set_var(DOCRAG_MODELS_DIR_ENV, temp.path());

    let base = ModelLocator::new().resolve_base_dir();
    let descriptor = ModelRegistry::default().resolve(ModelTask::SimilarityEmbedding, None);

    env::remove_var(DOCRAG_MODELS_DIR_ENV);

    assert_eq!(base.unwrap(), temp.path());
    let descriptor = descriptor.unwrap();
    assert_eq!(descriptor.dimension, 384);
    assert_eq!(descriptor.max_context_length, 512);
}

#[test]
fn test_generator_resolves_from_generators_dir() {
    let temp = TempDir::new().unwrap();
    let path = setup_mock_model(&temp, GENERATORS_SUBDIR, "flan-t5-base");

    let registry = ModelRegistry::new(ModelLocator::with_base_dir(temp.path()));
    let qa = registry.resolve(ModelTask::DocumentQa, None).unwrap();
    let summary = registry.resolve(ModelTask::Summarization, Some("flan-t5-base")).unwrap();

    assert_eq!(qa.root, path);
    assert_eq!(summary.root, path);
    assert_eq!(qa.task, ModelTask::DocumentQa);
}

#[test]
fn test_model_not_found_error_message() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join(EMBEDDINGS_SUBDIR)).unwrap();

    let locator = ModelLocator::with_base_dir(temp.path());
    let err = locator.embedding_model_path("missing-model").unwrap_err();

    let msg = format!("{}", err);
    assert!(msg.contains("Model not found: missing-model"));
    assert!(msg.contains("Expected at:"));
}

#[test]
fn test_models_dir_not_found_error_message() {
    let locator = ModelLocator::with_base_dir("/nonexistent/path");
    let err = locator.resolve_base_dir().unwrap_err();

    let msg = format!("{}", err);
    assert!(msg.contains("Models directory not found"));
    assert!(msg.contains("$DOCRAG_MODELS_DIR"));
}

#[test]
fn test_validate_incomplete_model_dir_missing_all() {
    let temp = TempDir::new().unwrap();
    let model_path = temp.path().join("empty-model");
    fs::create_dir_all(&model_path).unwrap();

    let locator = ModelLocator::with_base_dir(temp.path());
    match locator.validate_model_dir(&model_path).unwrap_err() {
        ModelError::IncompleteModelFiles { missing, .. } => {
            assert_eq!(missing.len(), 3);
            assert!(missing.contains(&"tokenizer.json"));
        }
        other => panic!("Expected IncompleteModelFiles, got {:?}", other),
    }
}
