//! Model sessions: an open engine bound to one descriptor and its tokenizer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::ModelDescriptor;
use crate::error::{ModelError, ModelResult};
use crate::tokenizer::TokenizerService;
use crate::{TextEncoder, TextGenerator};

/// The inference engine held by a session.
#[derive(Debug, Clone)]
pub enum SessionEngine {
    Encoder(Arc<dyn TextEncoder>),
    Generator(Arc<dyn TextGenerator>),
}

/// An open model: descriptor, tokenizer and engine.
///
/// Owned by the session manager's cache entry and handed out as `Arc`.
/// Closed when evicted.
#[derive(Debug)]
pub struct ModelSession {
    descriptor: ModelDescriptor,
    tokenizer: Arc<TokenizerService>,
    engine: SessionEngine,
    closed: AtomicBool,
}

impl ModelSession {
    pub fn new(
        descriptor: ModelDescriptor,
        tokenizer: Arc<TokenizerService>,
        engine: SessionEngine,
    ) -> Self {
        Self {
            descriptor,
            tokenizer,
            engine,
            closed: AtomicBool::new(false),
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn tokenizer(&self) -> &Arc<TokenizerService> {
        &self.tokenizer
    }

    pub fn encoder(&self) -> ModelResult<Arc<dyn TextEncoder>> {
        match &self.engine {
            SessionEngine::Encoder(encoder) => Ok(Arc::clone(encoder)),
            SessionEngine::Generator(_) => Err(ModelError::WrongEngine {
                model_id: self.descriptor.model_id.clone(),
                requested: "encoding",
            }),
        }
    }

    pub fn generator(&self) -> ModelResult<Arc<dyn TextGenerator>> {
        match &self.engine {
            SessionEngine::Generator(generator) => Ok(Arc::clone(generator)),
            SessionEngine::Encoder(_) => Err(ModelError::WrongEngine {
                model_id: self.descriptor.model_id.clone(),
                requested: "generation",
            }),
        }
    }

    /// Tokenize a prompt, generate and decode. Blocking.
    ///
    /// Prompts longer than the model context are truncated by the tokenizer.
    pub fn generate(&self, prompt: &str, max_new_tokens: usize) -> ModelResult<String> {
        let generator = self.generator()?;
        let tokens = self.tokenizer.tokenize(&[prompt])?;
        let prompt_ids = tokens
            .first()
            .map(|t| t.input_ids.as_slice())
            .unwrap_or_default();
        let output = generator.generate(prompt_ids, max_new_tokens)?;
        let text = self.tokenizer.decode(&output)?;
        Ok(text.trim().to_string())
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(
                task = %self.descriptor.task,
                model = %self.descriptor.model_id,
                "Closed model session"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SessionLoader
// ============================================================================

/// Opens a session for a resolved descriptor. Called on a blocking thread.
pub trait SessionLoader: Send + Sync {
    fn load(&self, descriptor: &ModelDescriptor) -> ModelResult<ModelSession>;
}

/// Production loader: tokenizer.json plus Candle weights.
#[cfg(feature = "embedded")]
#[derive(Debug, Clone, Default)]
pub struct CandleSessionLoader {
    config: crate::config::SessionConfig,
}

#[cfg(feature = "embedded")]
impl CandleSessionLoader {
    pub fn new(config: crate::config::SessionConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "embedded")]
impl SessionLoader for CandleSessionLoader {
    fn load(&self, descriptor: &ModelDescriptor) -> ModelResult<ModelSession> {
        let tokenizer = Arc::new(TokenizerService::from_file(
            &descriptor.tokenizer_path,
            descriptor.max_context_length,
            self.config.tokenizer_cache_capacity,
        )?);

        let engine = if descriptor.task.is_encoder() {
            let encoder = crate::encoder::CandleEncoder::load(descriptor, self.config.device)?;
            SessionEngine::Encoder(Arc::new(encoder))
        } else {
            let generator = crate::generator::CandleGenerator::load(descriptor, self.config.device)?;
            SessionEngine::Generator(Arc::new(generator))
        };

        Ok(ModelSession::new(descriptor.clone(), tokenizer, engine))
    }
}
