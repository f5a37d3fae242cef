//! Candle-based sentence encoder.

use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tracing::{debug, info};

use crate::config::{DevicePreference, ModelArchitecture, ModelDescriptor, ModelTask};
use crate::error::{ModelError, ModelResult};
use crate::tokenizer::PaddedBatch;
use crate::TextEncoder;

// ============================================================================
// ModelBackend enum
// ============================================================================

enum ModelBackend {
    Bert(BertModel),
    Roberta(XLMRobertaModel),
}

impl ModelBackend {
    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        match self {
            ModelBackend::Bert(model) => {
                model.forward(input_ids, token_type_ids, Some(attention_mask))
            }
            ModelBackend::Roberta(model) => {
                model.forward(input_ids, attention_mask, token_type_ids, None, None, None)
            }
        }
    }
}

// ============================================================================
// CandleEncoder
// ============================================================================

/// BERT / XLM-RoBERTa encoder with mean pooling and L2 normalisation.
pub struct CandleEncoder {
    model_id: String,
    dimension: usize,
    model: Mutex<ModelBackend>,
    device: Device,
}

impl std::fmt::Debug for CandleEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEncoder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish()
    }
}

unsafe impl Send for CandleEncoder {}
unsafe impl Sync for CandleEncoder {}

impl CandleEncoder {
    /// Memory-map the descriptor's weights onto the preferred device.
    pub fn load(descriptor: &ModelDescriptor, device: DevicePreference) -> ModelResult<Self> {
        info!(
            "Loading encoder '{}' from {:?} (arch={}, dim={})",
            descriptor.model_id, descriptor.root, descriptor.architecture, descriptor.dimension
        );

        let device = select_device(device)?;
        let load_err = |e: candle_core::Error| ModelError::model_load(&descriptor.model_id, e.to_string());

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&descriptor.weights_path], DTYPE, &device)
                .map_err(load_err)?
        };

        let content = std::fs::read_to_string(descriptor.root.join("config.json"))?;
        let model = match descriptor.architecture {
            ModelArchitecture::Bert | ModelArchitecture::Unknown => {
                let config: BertConfig = serde_json::from_str(&content)?;
                ModelBackend::Bert(BertModel::load(vb, &config).map_err(load_err)?)
            }
            ModelArchitecture::Roberta => {
                let config: XLMRobertaConfig = serde_json::from_str(&content)?;
                ModelBackend::Roberta(XLMRobertaModel::new(&config, vb).map_err(load_err)?)
            }
            ModelArchitecture::T5 => {
                return Err(ModelError::WrongEngine {
                    model_id: descriptor.model_id.clone(),
                    requested: "similarity embedding",
                })
            }
        };

        Ok(Self {
            model_id: descriptor.model_id.clone(),
            dimension: descriptor.dimension,
            model: Mutex::new(model),
            device,
        })
    }

    fn inference_err(&self, input_len: usize) -> impl Fn(candle_core::Error) -> ModelError + '_ {
        move |e| {
            ModelError::inference(
                ModelTask::SimilarityEmbedding,
                &self.model_id,
                input_len,
                e.to_string(),
            )
        }
    }

    fn mean_pooling(embeddings: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        let mask_expanded = mask
            .unsqueeze(2)?
            .to_dtype(DType::F32)?
            .broadcast_as(embeddings.shape())?;
        let sum = embeddings.broadcast_mul(&mask_expanded)?.sum(1)?;
        let count = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
        sum.broadcast_div(&count)
    }

    fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
        let norm = embeddings
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        embeddings.broadcast_div(&norm)
    }
}

impl TextEncoder for CandleEncoder {
    fn encode(&self, batch: &PaddedBatch) -> ModelResult<Vec<Vec<f32>>> {
        if batch.batch_size == 0 {
            return Ok(vec![]);
        }
        let err = self.inference_err(batch.batch_size);
        let shape = (batch.batch_size, batch.seq_len);

        let input_ids = Tensor::from_vec(batch.input_ids.clone(), shape, &self.device).map_err(&err)?;
        let attention_mask =
            Tensor::from_vec(batch.attention_mask.clone(), shape, &self.device).map_err(&err)?;
        let token_type_ids = input_ids.zeros_like().map_err(&err)?;

        let hidden_states = {
            let model = self.model.lock().map_err(|e| {
                ModelError::inference(
                    ModelTask::SimilarityEmbedding,
                    &self.model_id,
                    batch.batch_size,
                    e.to_string(),
                )
            })?;
            model
                .forward(&input_ids, &token_type_ids, &attention_mask)
                .map_err(&err)?
        };

        let pooled = Self::mean_pooling(&hidden_states, &attention_mask).map_err(&err)?;
        let normalized = Self::l2_normalize(&pooled).map_err(&err)?;
        let vectors = normalized.to_vec2::<f32>().map_err(&err)?;

        debug!(
            model = %self.model_id,
            batch = batch.batch_size,
            seq_len = batch.seq_len,
            "Encoded batch"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Device selection
// ============================================================================

pub(crate) fn select_device(pref: DevicePreference) -> ModelResult<Device> {
    match pref {
        DevicePreference::Auto => {
            if let Some(device) = try_gpu() {
                Ok(device)
            } else {
                info!("Using CPU");
                Ok(Device::Cpu)
            }
        }
        DevicePreference::Gpu => try_gpu().ok_or_else(|| ModelError::DeviceNotAvailable {
            reason: gpu_not_available_reason(),
        }),
        DevicePreference::Cpu => Ok(Device::Cpu),
    }
}

fn try_gpu() -> Option<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal GPU");
                return Some(device);
            }
            Err(e) => debug!("Metal not available: {}", e),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU");
                return Some(device);
            }
            Err(e) => debug!("CUDA not available: {}", e),
        }
    }

    None
}

fn gpu_not_available_reason() -> String {
    #[cfg(all(not(feature = "metal"), not(feature = "cuda")))]
    {
        return "the candle crate has not been built with GPU support. \
                Rebuild with --features metal (macOS) or --features cuda (NVIDIA GPU)"
            .to_string();
    }

    #[cfg(feature = "metal")]
    {
        return "Metal GPU not available on this system".to_string();
    }

    #[cfg(feature = "cuda")]
    {
        return "CUDA GPU not available. Ensure NVIDIA drivers and CUDA toolkit are installed"
            .to_string();
    }

    #[allow(unreachable_code)]
    "GPU not available".to_string()
}
