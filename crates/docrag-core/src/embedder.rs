//! Embedding generation over the similarity-embedding session.

use std::sync::Arc;

use docrag_db::vector::EmbeddingRecord;
use docrag_model::{ModelSession, ModelSessionManager, ModelTask, PaddedBatch};
use tracing::{debug, error};

use crate::errors::{DocragError, DocragResult};

/// Turns texts into numbered [`EmbeddingRecord`]s.
///
/// A call is all-or-nothing: any tokenization or inference failure fails
/// the whole call and no partial records are returned.
#[derive(Debug, Clone)]
pub struct EmbeddingGenerator {
    sessions: Arc<ModelSessionManager>,
    model_name: Option<String>,
    batch_size: usize,
}

impl EmbeddingGenerator {
    pub fn new(sessions: Arc<ModelSessionManager>, model_name: Option<String>, batch_size: usize) -> Self {
        Self {
            sessions,
            model_name,
            batch_size: batch_size.max(1),
        }
    }

    /// The similarity session, loading it on first use.
    pub async fn session(&self) -> DocragResult<Arc<ModelSession>> {
        Ok(self
            .sessions
            .try_get_instance(ModelTask::SimilarityEmbedding, self.model_name.as_deref())
            .await?)
    }

    /// Embed texts in input order, numbered from 1.
    pub async fn embed(&self, texts: &[String]) -> DocragResult<Vec<EmbeddingRecord>> {
        if texts.is_empty() {
            return Err(DocragError::InvalidArgument("no texts to embed".to_string()));
        }

        let session = self.session().await?;
        let owned = texts.to_vec();
        let batch_size = self.batch_size;

        let vectors = tokio::task::spawn_blocking(move || encode_all(&session, &owned, batch_size))
            .await
            .map_err(|e| DocragError::Inference(format!("embedding task failed: {e}")))??;

        Ok(texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| EmbeddingRecord::new(i as u32 + 1, text.clone(), vector))
            .collect())
    }

    /// Embed a single query. Same path as [`Self::embed`] with a batch of one.
    pub async fn embed_query(&self, text: &str) -> DocragResult<Vec<f32>> {
        let mut records = self.embed(&[text.to_string()]).await?;
        records
            .pop()
            .map(|r| r.vector)
            .ok_or_else(|| DocragError::Inference("encoder returned no vector".to_string()))
    }
}

/// Tokenize everything, then run one encoder call per padded batch. Blocking.
fn encode_all(session: &ModelSession, texts: &[String], batch_size: usize) -> DocragResult<Vec<Vec<f32>>> {
    let encoder = session.encoder()?;
    let tokenizer = session.tokenizer();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let tokens = tokenizer.batch_tokenize(&refs, batch_size).map_err(|e| {
        error!(
            model = %session.descriptor().model_id,
            inputs = texts.len(),
            error = %e,
            "Tokenization failed"
        );
        DocragError::from(e)
    })?;

    let expected_dim = encoder.dimension();
    let mut vectors = Vec::with_capacity(texts.len());
    for (index, chunk) in tokens.chunks(batch_size).enumerate() {
        let batch = PaddedBatch::from_results(chunk, tokenizer.pad_id());
        let output = encoder.encode(&batch).map_err(|e| {
            error!(
                model = %session.descriptor().model_id,
                batch = index,
                rows = chunk.len(),
                error = %e,
                "Encoder call failed"
            );
            DocragError::from(e)
        })?;

        if output.len() != chunk.len() {
            return Err(DocragError::Inference(format!(
                "encoder returned {} vectors for {} inputs",
                output.len(),
                chunk.len()
            )));
        }
        if let Some(bad) = output.iter().find(|v| v.len() != expected_dim) {
            return Err(DocragError::DimensionMismatch {
                expected: expected_dim,
                actual: bad.len(),
            });
        }
        vectors.extend(output);
    }

    debug!(
        model = %session.descriptor().model_id,
        texts = texts.len(),
        batches = texts.len().div_ceil(batch_size),
        dimension = expected_dim,
        "Embedded texts"
    );
    Ok(vectors)
}
