//! # docrag-model
//!
//! Inference layer for docrag: everything that turns text into token ids,
//! token ids into vectors, and prompts into generated text.
//!
//! - **Model registry**: static `(task, name)` table resolved into [`ModelDescriptor`]s
//! - **Model locator**: runtime path resolution for disk-based models
//! - **Tokenizer service**: cached, batched tokenization with a fail-fast constructor
//! - **Encoders / generators**: Candle BERT-family encoders and T5 generators
//! - **Session manager**: bounded, TTL-evicting, single-flight session cache keyed by task
//!
//! ## Design Principles
//!
//! 1. **Production-only**: No mock implementations. Test doubles live in consuming crates.
//! 2. **Local-first**: Candle inference over models installed on disk.
//! 3. **Provider-agnostic**: The engine traits don't leak Candle internals.
//!
//! ## Model Location
//!
//! Models are searched in this order:
//! 1. `$DOCRAG_MODELS_DIR` environment variable
//! 2. `~/.docrag/models` user directory
//! 3. `{exe_dir}/models` next to the binary
//!
//! ## Features
//!
//! - `embedded` (default): Local Candle inference
//! - `metal` / `cuda`: GPU acceleration

pub mod config;
pub mod error;
pub mod manager;
pub mod model_locator;
pub mod registry;
pub mod session;
pub mod tokenizer;

#[cfg(feature = "embedded")]
mod encoder;

#[cfg(feature = "embedded")]
mod generator;

pub use error::{ModelError, ModelResult};

pub use config::{
    DevicePreference, HuggingFaceModelConfig, ModelArchitecture, ModelDescriptor, ModelTask,
    SessionConfig,
};

pub use model_locator::{
    ModelLocator, DOCRAG_MODELS_DIR_ENV, EMBEDDINGS_SUBDIR, GENERATORS_SUBDIR,
    REQUIRED_MODEL_FILES,
};

pub use manager::ModelSessionManager;
pub use registry::{ModelRegistry, RegistryEntry};
pub use session::{ModelSession, SessionEngine, SessionLoader};
pub use tokenizer::{PaddedBatch, TokenizeResult, TokenizerService, DEFAULT_TOKENIZE_BATCH_SIZE};

// ============================================================================
// Engine Traits
// ============================================================================

/// A sentence encoder.
///
/// Takes one padded batch and returns one pooled, L2-normalised vector per
/// row, in row order.
pub trait TextEncoder: Send + Sync + std::fmt::Debug {
    fn encode(&self, batch: &PaddedBatch) -> ModelResult<Vec<Vec<f32>>>;

    /// Length of every vector returned by [`TextEncoder::encode`].
    fn dimension(&self) -> usize;

    fn model_id(&self) -> &str;
}

/// A sequence-to-sequence text generator.
pub trait TextGenerator: Send + Sync + std::fmt::Debug {
    /// Generate output ids for a prompt. The output excludes the decoder
    /// start token and the end-of-sequence token.
    fn generate(&self, prompt_ids: &[u32], max_new_tokens: usize) -> ModelResult<Vec<u32>>;

    fn model_id(&self) -> &str;
}

// ============================================================================
// Re-export implementations (feature-gated)
// ============================================================================

#[cfg(feature = "embedded")]
pub use encoder::CandleEncoder;

#[cfg(feature = "embedded")]
pub use generator::CandleGenerator;

#[cfg(feature = "embedded")]
pub use session::CandleSessionLoader;
