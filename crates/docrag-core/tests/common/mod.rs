//! Shared fixtures for docrag-core integration tests.
//!
//! Models are stood in for by a word-level tokenizer, a hashing encoder and
//! a generator with a canned answer, so the pipeline runs without weights.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docrag_core::{AppConfig, DocragEngine, DocragError, DocragResult, DocumentMeta, DocumentStore, Environment};
use docrag_db::vector::MemoryVectorStore;
use docrag_model::{
    ModelDescriptor, ModelResult, ModelSession, PaddedBatch, SessionEngine, SessionLoader,
    TextEncoder, TextGenerator, TokenizerService, REQUIRED_MODEL_FILES,
};
use tempfile::TempDir;

pub const DIMENSION: usize = 384;

pub const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": { "type": "WhitespaceSplit" },
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "[UNK]": 0, "[PAD]": 1, "Title": 2, "line": 3, "Body": 4,
      "one.": 5, "two.": 6, "three.": 7, "question:": 8, "context:": 9
    },
    "unk_token": "[UNK]"
  }
}"#;

// ============================================================================
// Engines
// ============================================================================

/// Bag-of-token-ids vector: one bucket per id, L2-normalised.
#[derive(Debug)]
pub struct HashingEncoder;

impl TextEncoder for HashingEncoder {
    fn encode(&self, batch: &PaddedBatch) -> ModelResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(batch.batch_size);
        for row in 0..batch.batch_size {
            let (ids, mask) = batch.row(row);
            let mut v = vec![0.0f32; DIMENSION];
            for (id, m) in ids.iter().zip(mask) {
                if *m == 1 {
                    v[*id as usize % DIMENSION] += 1.0;
                }
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                v.iter_mut().for_each(|x| *x /= norm);
            }
            out.push(v);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_id(&self) -> &str {
        "hashing"
    }
}

/// Always answers with ids `[2, 3]` ("Title line").
#[derive(Debug)]
pub struct FixedGenerator {
    calls: Arc<AtomicUsize>,
}

impl TextGenerator for FixedGenerator {
    fn generate(&self, _prompt_ids: &[u32], _max_new_tokens: usize) -> ModelResult<Vec<u32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![2, 3])
    }

    fn model_id(&self) -> &str {
        "fixed"
    }
}

/// Session loader that counts loads and generator calls.
#[derive(Default)]
pub struct FakeLoader {
    pub loads: AtomicUsize,
    pub generations: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }
}

impl SessionLoader for FakeLoader {
    fn load(&self, descriptor: &ModelDescriptor) -> ModelResult<ModelSession> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let tokenizer = Arc::new(TokenizerService::from_bytes(
            TOKENIZER_JSON.as_bytes(),
            descriptor.max_context_length,
            1000,
        )?);
        let engine = if descriptor.task.is_encoder() {
            SessionEngine::Encoder(Arc::new(HashingEncoder))
        } else {
            SessionEngine::Generator(Arc::new(FixedGenerator {
                calls: Arc::clone(&self.generations),
            }))
        };
        Ok(ModelSession::new(descriptor.clone(), tokenizer, engine))
    }
}

// ============================================================================
// Document store
// ============================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, DocumentMeta>>,
    fail_saves: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, hash: &str) -> Option<DocumentMeta> {
        self.docs.lock().unwrap().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn has_document(&self, content_hash: &str) -> DocragResult<bool> {
        Ok(self.docs.lock().unwrap().contains_key(content_hash))
    }

    async fn save_document(&self, content_hash: &str, meta: &DocumentMeta) -> DocragResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DocragError::InvalidArgument("database is read-only".to_string()));
        }
        self.docs
            .lock()
            .unwrap()
            .insert(content_hash.to_string(), meta.clone());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

fn install_model(base: &Path, subdir: &str, name: &str, config: &str) {
    let dir = base.join(subdir).join(name);
    fs::create_dir_all(&dir).unwrap();
    for file in REQUIRED_MODEL_FILES {
        fs::write(dir.join(file), "{}").unwrap();
    }
    fs::write(dir.join("config.json"), config).unwrap();
}

pub struct Harness {
    pub engine: DocragEngine,
    pub store: Arc<MemoryVectorStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub loader: Arc<FakeLoader>,
    pub workdir: TempDir,
}

impl Harness {
    /// Write a file into the working directory.
    pub fn write(&self, name: &str, content: &str) -> std::path::PathBuf {
        let path = self.workdir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let workdir = TempDir::new().unwrap();
    let models = workdir.path().join("models");
    install_model(
        &models,
        "embeddings",
        "all-MiniLM-L6-v2",
        r#"{"architectures":["BertModel"],"hidden_size":384,"max_position_embeddings":64}"#,
    );
    install_model(
        &models,
        "generators",
        "flan-t5-base",
        r#"{"architectures":["T5ForConditionalGeneration"],"d_model":8,"vocab_size":10}"#,
    );

    let mut config = AppConfig::default();
    config.models.dir = Some(models);
    config.vector_store.backend = "memory".to_string();
    config.environment = Environment::Test;
    configure(&mut config);

    let store = Arc::new(MemoryVectorStore::new());
    let documents = Arc::new(MemoryDocumentStore::default());
    let loader = Arc::new(FakeLoader::default());
    let engine = DocragEngine::from_parts(
        config,
        documents.clone(),
        loader.clone(),
        store.clone(),
    )
    .unwrap();

    Harness {
        engine,
        store,
        documents,
        loader,
        workdir,
    }
}
