//! Token-aware recursive text splitter.
//!
//! Text is split on the coarsest separator that occurs (paragraphs, lines,
//! sentences, words, characters) until each piece fits the chunk size, then
//! adjacent pieces are merged back up to the chunk size with a trailing
//! overlap carried into the next chunk. Length is measured in tokens.

use std::sync::Arc;

use docrag_model::TokenizerService;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::loader::{BlockCategory, FileType, RawBlock};

/// Separators tried in order; the empty separator splits into graphemes.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

// ============================================================================
// TokenCounter
// ============================================================================

/// Measures text length in tokens.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

impl TokenCounter for TokenizerService {
    fn count(&self, text: &str) -> usize {
        self.count_tokens(text)
            .unwrap_or_else(|_| WordCounter.count(text))
    }
}

/// Unicode word count; used when no tokenizer is loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.unicode_words().count()
    }
}

// ============================================================================
// TextSegment
// ============================================================================

/// Structural metadata carried by every segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub filename: String,
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// `block N`, optionally followed by the block's own location.
    pub location: String,
    pub category: BlockCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// One chunk of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub metadata: SegmentMetadata,
}

// ============================================================================
// TextSplitter
// ============================================================================

#[derive(Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    counter: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for TextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

impl TextSplitter {
    /// A zero chunk size is raised to one; the overlap is kept below the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize, counter: Arc<dyn TokenCounter>) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            counter,
        }
    }

    /// Cap the chunk size at a model's context length. A capped chunk keeps
    /// at most a quarter of itself as overlap.
    pub fn with_max_tokens(self, max_tokens: usize) -> Self {
        if max_tokens >= self.chunk_size {
            return self;
        }
        let chunk_size = max_tokens.max(1);
        Self::new(chunk_size, self.chunk_overlap.min(chunk_size / 4), self.counter)
    }

    /// Measure in `tokenizer` tokens and cap chunks so that, with the
    /// tokenizer's special tokens added, they fit `max_context`.
    pub fn for_encoder(self, tokenizer: Arc<TokenizerService>, max_context: usize) -> Self {
        let budget = max_context
            .min(tokenizer.max_length())
            .saturating_sub(tokenizer.special_token_count());
        let counter: Arc<dyn TokenCounter> = tokenizer;
        self.with_counter(counter).with_max_tokens(budget)
    }

    /// Measure with a different counter, keeping sizes.
    pub fn with_counter(self, counter: Arc<dyn TokenCounter>) -> Self {
        Self::new(self.chunk_size, self.chunk_overlap, counter)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split blocks into segments. Blocks are split independently and never
    /// merged with each other; segments follow block order.
    pub fn split(&self, blocks: &[RawBlock], filename: &str, file_type: FileType) -> Vec<TextSegment> {
        let mut segments = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            let location = match &block.location {
                Some(own) => format!("block {}, {}", index + 1, own),
                None => format!("block {}", index + 1),
            };
            for chunk in self.split_text(&block.text) {
                segments.push(TextSegment {
                    text: chunk,
                    metadata: SegmentMetadata {
                        filename: filename.to_string(),
                        file_type,
                        languages: block.languages.clone(),
                        location: location.clone(),
                        category: block.category,
                        page: block.page,
                    },
                });
            }
        }
        segments
    }

    /// Split one text into trimmed, non-empty chunks of at most `chunk_size` tokens
    /// (single graphemes larger than that are kept whole).
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if self.counter.count(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        let (separator, rest) = match separators.iter().position(|s| s.is_empty() || text.contains(s)) {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &[][..]),
        };

        // Sentence punctuation stays with its sentence; pieces rejoin on a space.
        let keeps_punctuation = !separator.trim().is_empty();
        let pieces: Vec<String> = if separator.is_empty() {
            text.graphemes(true).map(str::to_string).collect()
        } else if keeps_punctuation {
            text.split_inclusive(separator)
                .map(str::trim_end)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };
        let separator = if keeps_punctuation { " " } else { separator };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in pieces {
            if self.counter.count(&piece) <= self.chunk_size {
                fitting.push(piece);
            } else {
                if !fitting.is_empty() {
                    chunks.extend(self.merge(&fitting, separator));
                    fitting.clear();
                }
                if rest.is_empty() {
                    chunks.push(piece);
                } else {
                    chunks.extend(self.split_recursive(&piece, rest));
                }
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    /// Merge small pieces into chunks, carrying up to `chunk_overlap` tokens forward.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let separator_len = if separator.trim().is_empty() {
            0
        } else {
            self.counter.count(separator)
        };

        let mut chunks = Vec::new();
        let mut window: std::collections::VecDeque<(&str, usize)> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = self.counter.count(piece);
            let joined_len = if window.is_empty() { 0 } else { separator_len };

            if total + len + joined_len > self.chunk_size && !window.is_empty() {
                chunks.push(join(&window, separator));

                while total > self.chunk_overlap
                    || (total + len + separator_len > self.chunk_size && total > 0)
                {
                    let Some((_, front)) = window.pop_front() else {
                        break;
                    };
                    total = total.saturating_sub(front + if window.is_empty() { 0 } else { separator_len });
                }
            }

            total += len + if window.is_empty() { 0 } else { separator_len };
            window.push_back((piece.as_str(), len));
        }

        if !window.is_empty() {
            chunks.push(join(&window, separator));
        }
        chunks
    }
}

fn join(window: &std::collections::VecDeque<(&str, usize)>, separator: &str) -> String {
    window
        .iter()
        .map(|(p, _)| *p)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(chunk, overlap, Arc::new(WordCounter))
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(splitter(10, 2).split_text("Body one."), vec!["Body one."]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = (1..=50).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let s = splitter(10, 3);
        let chunks = s.split_text(&text);

        assert!(chunks.len() > 4);
        for chunk in &chunks {
            assert!(WordCounter.count(chunk) <= 10, "chunk too long: {chunk}");
        }
        assert!(chunks[0].starts_with("w1 "));
        assert!(chunks.last().unwrap().ends_with("w50"));
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let text = (1..=30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = splitter(10, 3).split_text(&text);

        let first_tail: Vec<&str> = chunks[0].split(' ').rev().take(2).collect();
        for word in first_tail {
            assert!(chunks[1].contains(word), "missing overlap word {word}");
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "alpha beta gamma\n\ndelta epsilon zeta";
        let chunks = splitter(4, 0).split_text(text);
        assert_eq!(chunks, vec!["alpha beta gamma", "delta epsilon zeta"]);
    }

    #[test]
    fn test_blocks_are_never_merged() {
        let blocks = vec![
            RawBlock::new("Title line\n\nBody one."),
            RawBlock::new("Body two.").with_page(2),
            RawBlock::new("   "),
            RawBlock::new("Body three.").with_location("row 9"),
        ];
        let segments = splitter(100, 10).split(&blocks, "doc.txt", FileType::Txt);

        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Title line\n\nBody one.", "Body two.", "Body three."]);
        assert_eq!(segments[1].metadata.page, Some(2));
        assert_eq!(segments[2].metadata.location, "block 4, row 9");
        assert_eq!(segments[0].metadata.filename, "doc.txt");
    }

    #[test]
    fn test_max_tokens_clamps_chunk_and_overlap() {
        let s = splitter(4096, 200).with_max_tokens(128);
        assert_eq!(s.chunk_size(), 128);
        assert_eq!(s.chunk_overlap(), 32);

        let s = splitter(4096, 200).with_max_tokens(512);
        assert_eq!(s.chunk_size(), 512);
        assert_eq!(s.chunk_overlap(), 128);

        let s = splitter(256, 16).with_max_tokens(8192);
        assert_eq!(s.chunk_size(), 256);
        assert_eq!(s.chunk_overlap(), 16);
    }

    #[test]
    fn test_sentence_split_keeps_punctuation() {
        let chunks = splitter(4, 0).split_text("One two three. Four five six. Seven eight nine.");
        assert_eq!(chunks, vec!["One two three.", "Four five six.", "Seven eight nine."]);
    }

    const CLS_SEP_TOKENIZER: &str = r#"{
      "version": "1.0",
      "truncation": null,
      "padding": null,
      "added_tokens": [],
      "normalizer": null,
      "pre_tokenizer": { "type": "WhitespaceSplit" },
      "post_processor": {
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
          "[CLS]": { "id": "[CLS]", "ids": [2], "tokens": ["[CLS]"] },
          "[SEP]": { "id": "[SEP]", "ids": [3], "tokens": ["[SEP]"] }
        }
      },
      "decoder": null,
      "model": {
        "type": "WordLevel",
        "vocab": { "[UNK]": 0, "[PAD]": 1, "[CLS]": 2, "[SEP]": 3 },
        "unk_token": "[UNK]"
      }
    }"#;

    #[test]
    fn test_encoder_chunks_fit_context_with_special_tokens() {
        let tokenizer =
            Arc::new(TokenizerService::from_bytes(CLS_SEP_TOKENIZER.as_bytes(), 16, 100).unwrap());
        let s = splitter(4096, 200).for_encoder(Arc::clone(&tokenizer), 16);
        assert_eq!(s.chunk_size(), 14);
        assert_eq!(s.chunk_overlap(), 3);

        let words: Vec<String> = (1..=100).map(|i| format!("w{i}")).collect();
        let chunks = s.split_text(&words.join(" "));
        assert!(chunks.len() < 15, "too many chunks: {}", chunks.len());

        for chunk in &chunks {
            let encoded = tokenizer.tokenize(&[chunk.as_str()]).unwrap();
            assert_eq!(encoded[0].len(), tokenizer.count_tokens(chunk).unwrap() + 2);
            assert!(encoded[0].len() <= 16, "chunk exceeds context: {chunk}");
        }
        for word in &words {
            assert!(
                chunks.iter().any(|c| c.split(' ').any(|w| w == word)),
                "lost {word}"
            );
        }
    }
}
