//! Candle-based T5 generator used for summarization, text generation and
//! document question answering.

use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::t5::{Config as T5Config, T5ForConditionalGeneration};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{DevicePreference, ModelArchitecture, ModelDescriptor, ModelTask};
use crate::encoder::select_device;
use crate::error::{ModelError, ModelResult};
use crate::TextGenerator;

/// Special token ids read from config.json.
#[derive(Debug, Clone, Deserialize)]
struct SpecialTokens {
    #[serde(default)]
    pad_token_id: u32,
    #[serde(default = "default_eos")]
    eos_token_id: u32,
    #[serde(default)]
    decoder_start_token_id: Option<u32>,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

fn default_eos() -> u32 {
    1
}

fn default_use_cache() -> bool {
    true
}

/// Greedy T5 decoder. One generation runs at a time per instance.
pub struct CandleGenerator {
    model_id: String,
    task: ModelTask,
    model: Mutex<T5ForConditionalGeneration>,
    tokens: SpecialTokens,
    device: Device,
}

impl std::fmt::Debug for CandleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleGenerator")
            .field("model_id", &self.model_id)
            .field("task", &self.task)
            .finish()
    }
}

unsafe impl Send for CandleGenerator {}
unsafe impl Sync for CandleGenerator {}

impl CandleGenerator {
    pub fn load(descriptor: &ModelDescriptor, device: DevicePreference) -> ModelResult<Self> {
        if descriptor.architecture != ModelArchitecture::T5 {
            return Err(ModelError::WrongEngine {
                model_id: descriptor.model_id.clone(),
                requested: "text generation",
            });
        }

        info!(
            "Loading generator '{}' from {:?} for {}",
            descriptor.model_id, descriptor.root, descriptor.task
        );

        let device = select_device(device)?;
        let load_err = |e: candle_core::Error| ModelError::model_load(&descriptor.model_id, e.to_string());

        let content = std::fs::read_to_string(descriptor.root.join("config.json"))?;
        let config: T5Config = serde_json::from_str(&content)?;
        let tokens: SpecialTokens = serde_json::from_str(&content)?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&descriptor.weights_path], DType::F32, &device)
                .map_err(load_err)?
        };
        let model = T5ForConditionalGeneration::load(vb, &config).map_err(load_err)?;

        Ok(Self {
            model_id: descriptor.model_id.clone(),
            task: descriptor.task,
            model: Mutex::new(model),
            tokens,
            device,
        })
    }

    fn run(
        &self,
        model: &mut T5ForConditionalGeneration,
        prompt_ids: &[u32],
        max_new_tokens: usize,
    ) -> candle_core::Result<Vec<u32>> {
        let input = Tensor::new(prompt_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input)?;

        let start = self
            .tokens
            .decoder_start_token_id
            .unwrap_or(self.tokens.pad_token_id);
        let mut output = vec![start];
        let mut logits_processor = LogitsProcessor::new(0, None, None);

        for step in 0..max_new_tokens {
            // The KV cache holds earlier positions, so only the newest token is fed.
            let decoder_input = if step == 0 || !self.tokens.use_cache {
                Tensor::new(output.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                Tensor::new(&output[output.len() - 1..], &self.device)?.unsqueeze(0)?
            };
            let logits = model
                .decode(&decoder_input, &encoder_output)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;
            let next = logits_processor.sample(&logits)?;
            if next == self.tokens.eos_token_id {
                break;
            }
            output.push(next);
        }

        Ok(output.split_off(1))
    }
}

impl TextGenerator for CandleGenerator {
    fn generate(&self, prompt_ids: &[u32], max_new_tokens: usize) -> ModelResult<Vec<u32>> {
        if prompt_ids.is_empty() {
            return Err(ModelError::invalid_input("empty prompt"));
        }

        let mut model = self.model.lock().map_err(|e| {
            ModelError::inference(self.task, &self.model_id, prompt_ids.len(), e.to_string())
        })?;
        let result = self.run(&mut model, prompt_ids, max_new_tokens);
        model.clear_kv_cache();

        let output = result.map_err(|e| {
            ModelError::inference(self.task, &self.model_id, prompt_ids.len(), e.to_string())
        })?;
        debug!(
            model = %self.model_id,
            prompt_tokens = prompt_ids.len(),
            generated = output.len(),
            "Generated sequence"
        );
        Ok(output)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
