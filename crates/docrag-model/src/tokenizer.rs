//! Tokenizer service: text to id/mask arrays, with a per-instance cache.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use rayon::prelude::*;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, warn};

use crate::error::{ModelError, ModelResult};

/// Default number of texts tokenized per chunk in [`TokenizerService::batch_tokenize`].
pub const DEFAULT_TOKENIZE_BATCH_SIZE: usize = 32;

/// Token ids and attention mask for one input text. Both have equal length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeResult {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl TokenizeResult {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

// ============================================================================
// PaddedBatch
// ============================================================================

/// Row-major `[batch_size, seq_len]` ids and mask ready for one inference call.
///
/// Every row is padded to the longest sequence in the batch; nothing is
/// truncated to the shortest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddedBatch {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl PaddedBatch {
    pub fn from_results(results: &[Arc<TokenizeResult>], pad_id: u32) -> Self {
        let batch_size = results.len();
        let seq_len = results.iter().map(|r| r.len()).max().unwrap_or(0);

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for result in results {
            let pad = seq_len - result.len();
            input_ids.extend_from_slice(&result.input_ids);
            input_ids.extend(std::iter::repeat(pad_id).take(pad));
            attention_mask.extend_from_slice(&result.attention_mask);
            attention_mask.extend(std::iter::repeat(0).take(pad));
        }

        Self {
            input_ids,
            attention_mask,
            batch_size,
            seq_len,
        }
    }

    /// Ids and mask of one row, including padding.
    pub fn row(&self, index: usize) -> (&[u32], &[u32]) {
        let range = index * self.seq_len..(index + 1) * self.seq_len;
        (&self.input_ids[range.clone()], &self.attention_mask[range])
    }
}

// ============================================================================
// TokenizerService
// ============================================================================

/// Wraps a pretrained tokenizer.
///
/// Results are cached by exact text. The cache belongs to this instance
/// only, since different models use different vocabularies.
pub struct TokenizerService {
    tokenizer: Tokenizer,
    cache: Cache<String, Arc<TokenizeResult>>,
    max_length: usize,
    pad_id: u32,
    encoded: AtomicUsize,
}

impl std::fmt::Debug for TokenizerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerService")
            .field("max_length", &self.max_length)
            .field("pad_id", &self.pad_id)
            .field("cached", &self.cache.entry_count())
            .finish()
    }
}

impl TokenizerService {
    /// Load a `tokenizer.json` definition.
    ///
    /// Fails here, not at first use, if the file is missing or corrupt.
    pub fn from_file(
        path: impl AsRef<Path>,
        max_length: usize,
        cache_capacity: u64,
    ) -> ModelResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::tokenizer_load(path, "file not found"));
        }
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| ModelError::tokenizer_load(path, e.to_string()))?;
        Self::from_tokenizer(tokenizer, max_length, cache_capacity)
            .map_err(|e| ModelError::tokenizer_load(path, e.to_string()))
    }

    /// Build from an in-memory `tokenizer.json` definition.
    pub fn from_bytes(bytes: &[u8], max_length: usize, cache_capacity: u64) -> ModelResult<Self> {
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| ModelError::tokenizer_load("<memory>", e.to_string()))?;
        Self::from_tokenizer(tokenizer, max_length, cache_capacity)
    }

    /// Wrap an already constructed tokenizer.
    pub fn from_tokenizer(
        mut tokenizer: Tokenizer,
        max_length: usize,
        cache_capacity: u64,
    ) -> ModelResult<Self> {
        if max_length == 0 {
            return Err(ModelError::configuration("max_length must be positive"));
        }

        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .or_else(|| tokenizer.token_to_id("<pad>"))
            .unwrap_or(0);

        // Padding is applied per batch by the encoder, not per text.
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| ModelError::tokenization(e.to_string()))?;

        Ok(Self {
            tokenizer,
            cache: Cache::new(cache_capacity),
            max_length,
            pad_id,
            encoded: AtomicUsize::new(0),
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Number of texts that went through the underlying encoder.
    pub fn encode_count(&self) -> usize {
        self.encoded.load(Ordering::Relaxed)
    }

    /// Tokenize texts, returning one result per input in input order.
    ///
    /// Empty or whitespace-only texts are rejected.
    pub fn tokenize(&self, texts: &[&str]) -> ModelResult<Vec<Arc<TokenizeResult>>> {
        if texts.is_empty() {
            return Err(ModelError::invalid_input("no texts to tokenize"));
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(ModelError::invalid_input(format!(
                "text at position {pos} is empty"
            )));
        }

        let mut results: Vec<Option<Arc<TokenizeResult>>> =
            texts.iter().map(|t| self.cache.get(*t)).collect();
        let misses: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_none().then_some(i))
            .collect();

        if !misses.is_empty() {
            let inputs: Vec<String> = misses.iter().map(|&i| texts[i].to_string()).collect();
            let encodings = self
                .tokenizer
                .encode_batch(inputs, true)
                .map_err(|e| ModelError::tokenization(e.to_string()))?;
            self.encoded.fetch_add(misses.len(), Ordering::Relaxed);

            for (&i, encoding) in misses.iter().zip(encodings) {
                if !encoding.get_overflowing().is_empty() {
                    warn!(
                        position = i,
                        max_length = self.max_length,
                        "Input exceeds the model context and was truncated"
                    );
                }
                let result = Arc::new(TokenizeResult {
                    input_ids: encoding.get_ids().to_vec(),
                    attention_mask: encoding.get_attention_mask().to_vec(),
                });
                self.cache.insert(texts[i].to_string(), Arc::clone(&result));
                results[i] = Some(result);
            }
        }

        debug!(
            total = texts.len(),
            encoded = misses.len(),
            "Tokenized texts"
        );
        Ok(results.into_iter().flatten().collect())
    }

    /// Tokenize in fixed-size chunks processed in parallel.
    ///
    /// Output order matches input order regardless of `batch_size`.
    pub fn batch_tokenize(
        &self,
        texts: &[&str],
        batch_size: usize,
    ) -> ModelResult<Vec<Arc<TokenizeResult>>> {
        if texts.is_empty() {
            return Err(ModelError::invalid_input("no texts to tokenize"));
        }
        let batch_size = batch_size.max(1);
        let chunks = texts
            .par_chunks(batch_size)
            .map(|chunk| self.tokenize(chunk))
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(chunks.into_iter().flatten().collect())
    }

    /// Turn generated ids back into text, dropping special tokens.
    pub fn decode(&self, ids: &[u32]) -> ModelResult<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| ModelError::tokenization(e.to_string()))
    }

    /// Tokens the post-processor adds around every single input, such as
    /// `[CLS]` and `[SEP]`.
    pub fn special_token_count(&self) -> usize {
        self.tokenizer
            .encode("", true)
            .map(|encoding| encoding.len())
            .unwrap_or(0)
    }

    /// Count tokens without special tokens and without the truncation cap.
    ///
    /// Not cached: the splitter measures many transient fragments.
    pub fn count_tokens(&self, text: &str) -> ModelResult<usize> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ModelError::tokenization(e.to_string()))?;
        let overflow: usize = encoding.get_overflowing().iter().map(|e| e.len()).sum();
        Ok(encoding.len() + overflow)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn word_level_json(words: &[&str]) -> String {
        let mut vocab = vec![("[UNK]".to_string(), 0u32), ("[PAD]".to_string(), 1u32)];
        vocab.extend(
            words
                .iter()
                .enumerate()
                .map(|(i, w)| (w.to_string(), i as u32 + 2)),
        );
        let vocab: serde_json::Map<String, serde_json::Value> = vocab
            .into_iter()
            .map(|(w, id)| (w, serde_json::Value::from(id)))
            .collect();
        serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
        })
        .to_string()
    }

    /// Add a BERT-style `[CLS] $A [SEP]` post-processor to a definition.
    fn with_cls_sep(json: &str) -> String {
        let mut value: serde_json::Value = serde_json::from_str(json).unwrap();
        value["post_processor"] = serde_json::json!({
            "type": "TemplateProcessing",
            "single": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } }
            ],
            "pair": [
                { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                { "Sequence": { "id": "A", "type_id": 0 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 0 } },
                { "Sequence": { "id": "B", "type_id": 1 } },
                { "SpecialToken": { "id": "[SEP]", "type_id": 1 } }
            ],
            "special_tokens": {
                "[CLS]": { "id": "[CLS]", "ids": [101], "tokens": ["[CLS]"] },
                "[SEP]": { "id": "[SEP]", "ids": [102], "tokens": ["[SEP]"] }
            }
        });
        value.to_string()
    }

    fn service(max_length: usize) -> TokenizerService {
        let json = word_level_json(&["alpha", "beta", "gamma", "delta"]);
        TokenizerService::from_bytes(json.as_bytes(), max_length, 100).unwrap()
    }

    #[test]
    fn test_tokenize_ids_and_mask() {
        let service = service(16);
        let results = service.tokenize(&["alpha beta", "delta"]).unwrap();
        assert_eq!(results[0].input_ids, vec![2, 3]);
        assert_eq!(results[0].attention_mask, vec![1, 1]);
        assert_eq!(results[1].input_ids, vec![5]);
        assert_eq!(service.pad_id(), 1);
    }

    #[test]
    fn test_cache_skips_encoder() {
        let service = service(16);
        let first = service.tokenize(&["alpha gamma"]).unwrap();
        assert_eq!(service.encode_count(), 1);

        let second = service.tokenize(&["alpha gamma"]).unwrap();
        assert_eq!(service.encode_count(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_text_rejected() {
        let service = service(16);
        let err = service.tokenize(&["alpha", "   "]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput { .. }));
        assert!(service.tokenize(&[]).is_err());
        assert_eq!(service.encode_count(), 0);
    }

    #[test]
    fn test_batch_order_independent_of_batch_size() {
        let texts = [
            "alpha", "beta", "gamma", "delta", "alpha beta", "gamma delta", "beta alpha",
        ];
        let small = service(16).batch_tokenize(&texts, 2).unwrap();
        let large = service(16).batch_tokenize(&texts, 32).unwrap();
        assert_eq!(small.len(), texts.len());
        assert_eq!(small, large);
        assert_eq!(small[6].input_ids, vec![3, 2]);
    }

    #[test]
    fn test_padded_batch_pads_to_longest() {
        let service = service(16);
        let results = service.tokenize(&["alpha", "alpha beta gamma"]).unwrap();
        let batch = PaddedBatch::from_results(&results, service.pad_id());

        assert_eq!(batch.batch_size, 2);
        assert_eq!(batch.seq_len, 3);
        assert_eq!(batch.row(0), (&[2, 1, 1][..], &[1, 0, 0][..]));
        assert_eq!(batch.row(1), (&[2, 3, 4][..], &[1, 1, 1][..]));
    }

    #[test]
    fn test_truncates_at_max_length() {
        let service = service(3);
        let results = service.tokenize(&["alpha beta gamma delta alpha"]).unwrap();
        assert_eq!(results[0].len(), 3);
        assert_eq!(service.count_tokens("alpha beta gamma delta alpha").unwrap(), 5);
    }

    #[test]
    fn test_special_token_count() {
        assert_eq!(service(16).special_token_count(), 0);

        let json = with_cls_sep(&word_level_json(&["alpha", "beta"]));
        let service = TokenizerService::from_bytes(json.as_bytes(), 16, 10).unwrap();
        assert_eq!(service.special_token_count(), 2);
        assert_eq!(service.count_tokens("alpha beta").unwrap(), 2);
        assert_eq!(service.tokenize(&["alpha beta"]).unwrap()[0].len(), 4);
    }

    #[test]
    fn test_missing_file_fails_fast() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = TokenizerService::from_file(temp.path().join("tokenizer.json"), 16, 10).unwrap_err();
        assert!(matches!(err, ModelError::TokenizerLoad { .. }));

        let corrupt = temp.path().join("corrupt.json");
        std::fs::write(&corrupt, "{ not json").unwrap();
        let err = TokenizerService::from_file(&corrupt, 16, 10).unwrap_err();
        assert!(matches!(err, ModelError::TokenizerLoad { .. }));
    }
}
