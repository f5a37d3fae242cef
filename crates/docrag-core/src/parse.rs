//! File parsing: load, split and derive document metadata.
//!
//! [`DocumentParser::parse_file_content`] never returns an error. Every
//! failure (unsupported extension, unreadable file, empty extraction,
//! timeout) becomes [`ParseOutcome::Failed`] so the ingestion caller can
//! tell it apart from a successful parse and skip persistence.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ExtractionSection;
use crate::errors::DocragResult;
use crate::loader::{DocumentLoader, FileType, LoadedDocument, LoaderMetadata};
use crate::splitter::{TextSegment, TextSplitter, WordCounter};

/// Longest derived title, in characters.
pub const TITLE_MAX_CHARS: usize = 100;

/// Longest derived description, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 255;

/// Punctuation stripped from the first line when deriving a title.
const MARKUP_CHARS: &[char] = &['#', '*', '_', '`', '~', '>', '|', '[', ']', '{', '}', '<', '=', '\\'];

// ============================================================================
// DocumentMeta
// ============================================================================

/// Document metadata handed to the external document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl DocumentMeta {
    /// Derive metadata from the first segment and whatever the loader found.
    ///
    /// `fallback_title` is used when neither source yields a title.
    pub fn derive(first: Option<&TextSegment>, loader: &LoaderMetadata, fallback_title: &str) -> Self {
        let first_text = first.map(|s| s.text.as_str()).unwrap_or_default();

        let title = loader
            .title
            .as_deref()
            .map(clean_markup)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                first_text
                    .lines()
                    .map(clean_markup)
                    .find(|line| !line.is_empty())
            })
            .unwrap_or_else(|| fallback_title.to_string());
        let title = truncate_chars(&title, TITLE_MAX_CHARS);

        let description = truncate_chars(&collapse_whitespace(first_text), DESCRIPTION_MAX_CHARS);

        Self {
            keywords: keywords(&title),
            title,
            description,
            authors: loader.authors.clone(),
            cover_url: loader.cover_url.clone(),
        }
    }
}

/// Remove markup punctuation and collapse whitespace.
pub fn clean_markup(line: &str) -> String {
    let stripped: String = line
        .chars()
        .map(|c| if MARKUP_CHARS.contains(&c) { ' ' } else { c })
        .collect();
    collapse_whitespace(&stripped)
}

/// Split a title into distinct keywords, keeping first-seen order.
pub fn keywords(title: &str) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for word in title.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '/' | '-')) {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if word.is_empty() || seen.iter().any(|w| w.eq_ignore_ascii_case(word)) {
            continue;
        }
        seen.push(word.to_string());
    }
    seen
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect::<String>().trim_end().to_string()
}

// ============================================================================
// ParseOutcome
// ============================================================================

/// A successfully parsed document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDocument {
    pub file_type: FileType,
    pub segments: Vec<TextSegment>,
    pub meta: DocumentMeta,
}

/// Result of parsing one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state_kind", rename_all = "snake_case")]
pub enum ParseOutcome {
    Parsed(ParsedDocument),
    Failed { reason: String },
}

impl ParseOutcome {
    /// `true` for a usable parse.
    pub fn state(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Split loaded blocks and derive metadata. Empty extraction is a failure.
pub fn parse_blocks(
    document: &LoadedDocument,
    filename: &str,
    file_type: FileType,
    splitter: &TextSplitter,
) -> ParseOutcome {
    if document.is_empty() {
        return ParseOutcome::failed(format!("no text extracted from {filename}"));
    }

    let segments = splitter.split(&document.blocks, filename, file_type);
    if segments.is_empty() {
        return ParseOutcome::failed(format!("no text extracted from {filename}"));
    }

    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    let meta = DocumentMeta::derive(segments.first(), &document.metadata, stem);

    ParseOutcome::Parsed(ParsedDocument {
        file_type,
        segments,
        meta,
    })
}

// ============================================================================
// DocumentParser
// ============================================================================

/// Loads and splits files with a bounded parse time.
#[derive(Debug, Clone)]
pub struct DocumentParser {
    loader: DocumentLoader,
    splitter: TextSplitter,
    parse_timeout: Duration,
}

impl DocumentParser {
    pub fn new(loader: DocumentLoader, splitter: TextSplitter) -> Self {
        Self {
            loader,
            splitter,
            parse_timeout: Duration::from_secs(3 * 60 * 60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout = timeout;
        self
    }

    /// Build from extraction settings, measuring length in words until a
    /// tokenizer is supplied through [`Self::parse_with`].
    pub fn from_config(config: &ExtractionSection) -> DocragResult<Self> {
        let loader = DocumentLoader::from_config(config)?;
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap, Arc::new(WordCounter));
        Ok(Self::new(loader, splitter).with_timeout(Duration::from_secs(config.parse_timeout_secs)))
    }

    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    /// Parse with the configured splitter.
    pub async fn parse_file_content(&self, path: &Path, extension: &str) -> ParseOutcome {
        self.parse_with(path, extension, &self.splitter).await
    }

    /// Parse with a caller-supplied splitter (e.g. one measuring with the
    /// embedding model's tokenizer).
    pub async fn parse_with(&self, path: &Path, extension: &str, splitter: &TextSplitter) -> ParseOutcome {
        let file_type = match FileType::from_extension(extension) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), extension, "Unsupported file type");
                return ParseOutcome::failed(e.to_string());
            }
        };

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let loaded = match tokio::time::timeout(self.parse_timeout, self.loader.load(path, file_type)).await {
            Ok(Ok(doc)) => doc,
            Ok(Err(e)) => {
                warn!(path = %path.display(), %file_type, error = %e, "Failed to load document");
                return ParseOutcome::failed(e.to_string());
            }
            Err(_) => {
                warn!(
                    path = %path.display(),
                    secs = self.parse_timeout.as_secs(),
                    "Document parsing timed out"
                );
                return ParseOutcome::failed(format!(
                    "parsing timed out after {}s",
                    self.parse_timeout.as_secs()
                ));
            }
        };

        debug!(path = %path.display(), blocks = loaded.blocks.len(), "Loaded blocks");
        let outcome = parse_blocks(&loaded, &filename, file_type, splitter);
        match &outcome {
            ParseOutcome::Parsed(doc) => info!(
                path = %path.display(),
                %file_type,
                segments = doc.segments.len(),
                title = %doc.meta.title,
                "Parsed document"
            ),
            ParseOutcome::Failed { reason } => warn!(path = %path.display(), %reason, "Parse failed"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::RawBlock;

    fn splitter() -> TextSplitter {
        TextSplitter::new(4096, 200, Arc::new(WordCounter))
    }

    #[test]
    fn test_title_from_first_line() {
        let doc = LoadedDocument::from_blocks(vec![
            RawBlock::new("## **Title line**\n\nBody one."),
            RawBlock::new("Body two."),
        ]);
        let ParseOutcome::Parsed(parsed) = parse_blocks(&doc, "a.md", FileType::Markdown, &splitter()) else {
            panic!("expected parse");
        };

        assert_eq!(parsed.meta.title, "Title line");
        assert_eq!(parsed.meta.keywords, vec!["Title", "line"]);
        assert_eq!(parsed.meta.description, "## **Title line** Body one.");
        assert_eq!(parsed.segments.len(), 2);
    }

    #[test]
    fn test_loader_metadata_wins() {
        let mut doc = LoadedDocument::from_blocks(vec![RawBlock::new("Chapter text")]);
        doc.metadata.title = Some("Moby Dick".to_string());
        doc.metadata.authors = vec!["Herman Melville".to_string()];

        let ParseOutcome::Parsed(parsed) = parse_blocks(&doc, "m.epub", FileType::Epub, &splitter()) else {
            panic!("expected parse");
        };
        assert_eq!(parsed.meta.title, "Moby Dick");
        assert_eq!(parsed.meta.authors, vec!["Herman Melville"]);
    }

    #[test]
    fn test_bounds() {
        let long = "x".repeat(400);
        let doc = LoadedDocument::from_blocks(vec![RawBlock::new(long.clone())]);
        let ParseOutcome::Parsed(parsed) = parse_blocks(&doc, "l.txt", FileType::Txt, &splitter()) else {
            panic!("expected parse");
        };
        assert_eq!(parsed.meta.title.chars().count(), TITLE_MAX_CHARS);
        assert_eq!(parsed.meta.description.chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn test_empty_extraction_is_failure() {
        let doc = LoadedDocument::from_blocks(vec![RawBlock::new("  \n ")]);
        let outcome = parse_blocks(&doc, "e.txt", FileType::Txt, &splitter());
        assert!(!outcome.state());
    }

    #[test]
    fn test_keywords_dedup() {
        assert_eq!(keywords("Rust - the rust Book: 2nd"), vec!["Rust", "the", "Book", "2nd"]);
    }

    #[tokio::test]
    async fn test_unsupported_extension_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.exe");
        std::fs::write(&path, "MZ").unwrap();

        let parser = DocumentParser::new(DocumentLoader::new(1024), splitter());
        let outcome = parser.parse_file_content(&path, "exe").await;
        assert!(matches!(outcome, ParseOutcome::Failed { ref reason } if reason.contains("exe")));
    }

    #[tokio::test]
    async fn test_parse_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Title line\n\nBody one.").unwrap();

        let parser = DocumentParser::new(DocumentLoader::new(1024), splitter());
        let ParseOutcome::Parsed(parsed) = parser.parse_file_content(&path, "txt").await else {
            panic!("expected parse");
        };
        assert_eq!(parsed.meta.title, "Title line");
        assert_eq!(parsed.segments[0].metadata.filename, "notes.txt");
    }
}
