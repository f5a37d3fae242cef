//! Document loading.
//!
//! A [`FileType`] is resolved from the file extension through a fixed table,
//! then dispatched to a local format loader or to the layout extraction
//! service. Every loader produces ordered [`RawBlock`]s; splitting into
//! segments happens later in [`crate::splitter`].

mod docx;
mod epub;
mod markup;
mod pdf;
mod text;
pub mod unstructured;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{DocragError, DocragResult};
pub use unstructured::{select_strategy, ExtractionStrategy, UnstructuredClient};

// ============================================================================
// FileType
// ============================================================================

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Epub,
    Docx,
    Txt,
    Csv,
    Tsv,
    Markdown,
    Html,
    Image,
}

/// Extension lookup table. Extensions are matched case-insensitively.
const EXTENSIONS: &[(&str, FileType)] = &[
    ("pdf", FileType::Pdf),
    ("epub", FileType::Epub),
    ("docx", FileType::Docx),
    ("txt", FileType::Txt),
    ("csv", FileType::Csv),
    ("tsv", FileType::Tsv),
    ("md", FileType::Markdown),
    ("markdown", FileType::Markdown),
    ("html", FileType::Html),
    ("htm", FileType::Html),
    ("png", FileType::Image),
    ("jpg", FileType::Image),
    ("jpeg", FileType::Image),
    ("tiff", FileType::Image),
    ("bmp", FileType::Image),
    ("gif", FileType::Image),
];

impl FileType {
    /// Resolve an extension (with or without the leading dot).
    pub fn from_extension(ext: &str) -> DocragResult<Self> {
        let normalized = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(e, _)| *e == normalized)
            .map(|(_, t)| *t)
            .ok_or(DocragError::UnsupportedFileType(normalized))
    }

    /// Resolve from a path's extension.
    pub fn from_path(path: &Path) -> DocragResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| DocragError::UnsupportedFileType(path.display().to_string()))?;
        Self::from_extension(ext)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Image => "image",
        }
    }

    /// Formats that go through the layout extraction service when it is configured.
    pub fn prefers_extractor(&self) -> bool {
        matches!(self, Self::Markdown | Self::Html | Self::Image)
    }

    /// Formats with no local loader.
    pub fn requires_extractor(&self) -> bool {
        matches!(self, Self::Image)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FileType {
    type Err = DocragError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// Structural role of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    Title,
    #[default]
    Body,
    ListItem,
    Table,
    Page,
    Chapter,
    Row,
}

impl BlockCategory {
    /// Map an extraction-service element type.
    pub fn from_element_type(kind: &str) -> Self {
        match kind {
            "Title" | "Header" => Self::Title,
            "ListItem" => Self::ListItem,
            "Table" => Self::Table,
            _ => Self::Body,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Body => "body",
            Self::ListItem => "list_item",
            Self::Table => "table",
            Self::Page => "page",
            Self::Chapter => "chapter",
            Self::Row => "row",
        }
    }
}

/// One unit of extracted text, before splitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    pub text: String,
    pub category: BlockCategory,
    /// 1-based page, when the format has pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Format-specific location, e.g. `row 3` or a chapter href.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl RawBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: BlockCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Document-level metadata some formats carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub cover_url: Option<String>,
}

/// Output of a loader.
#[derive(Debug, Clone, Default)]
pub struct LoadedDocument {
    pub blocks: Vec<RawBlock>,
    pub metadata: LoaderMetadata,
}

impl LoadedDocument {
    pub fn from_blocks(blocks: Vec<RawBlock>) -> Self {
        Self {
            blocks,
            metadata: LoaderMetadata::default(),
        }
    }

    /// True when no block carries any non-whitespace text.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.text.trim().is_empty())
    }
}

// ============================================================================
// DocumentLoader
// ============================================================================

/// Dispatches a file to the loader for its format.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    extractor: Option<UnstructuredClient>,
    large_file_threshold: u64,
}

impl DocumentLoader {
    pub fn new(large_file_threshold: u64) -> Self {
        Self {
            extractor: None,
            large_file_threshold,
        }
    }

    /// Route rich formats through the layout extraction service.
    pub fn with_extractor(mut self, extractor: UnstructuredClient) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build from extraction settings; an unset URL leaves the service disabled.
    pub fn from_config(config: &crate::config::ExtractionSection) -> DocragResult<Self> {
        let loader = Self::new(config.large_file_threshold);
        match &config.unstructured_url {
            Some(url) => {
                let client = UnstructuredClient::new(
                    url.clone(),
                    config.unstructured_api_key.clone(),
                    Duration::from_secs(config.request_timeout_secs),
                )?;
                Ok(loader.with_extractor(client))
            }
            None => {
                debug!("Layout extraction service not configured");
                Ok(loader)
            }
        }
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    /// Load a file into ordered blocks.
    pub async fn load(&self, path: &Path, file_type: FileType) -> DocragResult<LoadedDocument> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| DocragError::load(path, e.to_string()))?
            .len();

        if file_type.prefers_extractor() {
            if let Some(extractor) = &self.extractor {
                let strategy = select_strategy(file_type, size, self.large_file_threshold);
                info!(
                    path = %path.display(),
                    %file_type,
                    ?strategy,
                    size,
                    "Loading through layout extraction"
                );
                let blocks = extractor.partition(path, strategy).await?;
                return Ok(LoadedDocument::from_blocks(blocks));
            }
            if file_type.requires_extractor() {
                return Err(DocragError::ExtractorUnavailable(file_type.to_string()));
            }
        }

        debug!(path = %path.display(), %file_type, size, "Loading locally");
        let owned: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || load_local(&owned, file_type))
            .await
            .map_err(|e| DocragError::load(path, format!("loader task failed: {e}")))?
    }
}

/// Format-specific local loaders. Blocking.
fn load_local(path: &Path, file_type: FileType) -> DocragResult<LoadedDocument> {
    match file_type {
        FileType::Pdf => pdf::load(path),
        FileType::Epub => epub::load(path),
        FileType::Docx => docx::load(path),
        FileType::Txt => text::load_plain(path),
        FileType::Csv => text::load_delimited(path, b','),
        FileType::Tsv => text::load_delimited(path, b'\t'),
        FileType::Markdown => markup::load_markdown(path),
        FileType::Html => markup::load_html(path),
        FileType::Image => Err(DocragError::ExtractorUnavailable(file_type.to_string())),
    }
}

/// Decode common XML entities.
pub(crate) fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// First `<tag ...>value</tag>` in an XML string.
pub(crate) fn xml_element(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?s)<{tag}(?:\s[^>]*)?>(.*?)</{tag}>", tag = regex::escape(tag));
    let re = regex::Regex::new(&pattern).ok()?;
    re.captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()).trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Every `<tag ...>value</tag>` in an XML string, in document order.
pub(crate) fn xml_elements(xml: &str, tag: &str) -> Vec<String> {
    let pattern = format!(r"(?s)<{tag}(?:\s[^>]*)?>(.*?)</{tag}>", tag = regex::escape(tag));
    match regex::Regex::new(&pattern) {
        Ok(re) => re
            .captures_iter(xml)
            .filter_map(|c| c.get(1))
            .map(|m| decode_entities(m.as_str()).trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}
