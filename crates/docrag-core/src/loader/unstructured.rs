//! Client for the layout-aware extraction service (Unstructured API).
//!
//! The service partitions a document into typed elements (titles, narrative
//! text, tables) and is used for formats without a good local loader.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BlockCategory, FileType, RawBlock};
use crate::errors::{DocragError, DocragResult};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "unstructured-api-key";

/// Extraction fidelity requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Text-layer extraction only.
    Fast,
    /// Layout model with table structure inference.
    HiRes,
    /// OCR for images and scans.
    OcrOnly,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::HiRes => "hi_res",
            Self::OcrOnly => "ocr_only",
        }
    }
}

/// Pick a strategy: images are OCR'd, large files use fast extraction,
/// everything else gets high-resolution extraction.
pub fn select_strategy(file_type: FileType, size: u64, large_file_threshold: u64) -> ExtractionStrategy {
    if file_type == FileType::Image {
        ExtractionStrategy::OcrOnly
    } else if size > large_file_threshold {
        ExtractionStrategy::Fast
    } else {
        ExtractionStrategy::HiRes
    }
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: ElementMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ElementMetadata {
    page_number: Option<u32>,
    #[serde(default)]
    languages: Vec<String>,
}

/// HTTP client for the extraction service.
#[derive(Debug, Clone)]
pub struct UnstructuredClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl UnstructuredClient {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> DocragResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DocragError::configuration(
                format!("Failed to build extraction client: {e}"),
                "Check extraction.unstructuredUrl",
            )
        })?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }

    /// Upload a file and return its elements as blocks, in document order.
    pub async fn partition(&self, path: &Path, strategy: ExtractionStrategy) -> DocragResult<Vec<RawBlock>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DocragError::load(path, e.to_string()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let mut form = Form::new()
            .part("files", Part::bytes(bytes).file_name(filename))
            .text("strategy", strategy.as_str());
        if strategy == ExtractionStrategy::HiRes {
            form = form.text("pdf_infer_table_structure", "true");
        }

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DocragError::load(path, format!("extraction request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocragError::load(
                path,
                format!("extraction service returned {status}: {body}"),
            ));
        }

        let elements: Vec<Element> = response
            .json()
            .await
            .map_err(|e| DocragError::load(path, format!("unreadable extraction response: {e}")))?;

        debug!(path = %path.display(), elements = elements.len(), "Partitioned document");
        Ok(to_blocks(elements))
    }
}

fn to_blocks(elements: Vec<Element>) -> Vec<RawBlock> {
    elements
        .into_iter()
        .filter(|e| !e.text.trim().is_empty())
        .map(|e| RawBlock {
            text: e.text.trim().to_string(),
            category: BlockCategory::from_element_type(&e.kind),
            page: e.metadata.page_number,
            languages: e.metadata.languages,
            location: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        let mb = 1024 * 1024;
        assert_eq!(select_strategy(FileType::Image, 10, 20 * mb), ExtractionStrategy::OcrOnly);
        assert_eq!(select_strategy(FileType::Image, 30 * mb, 20 * mb), ExtractionStrategy::OcrOnly);
        assert_eq!(select_strategy(FileType::Html, 30 * mb, 20 * mb), ExtractionStrategy::Fast);
        assert_eq!(select_strategy(FileType::Markdown, mb, 20 * mb), ExtractionStrategy::HiRes);
    }

    #[test]
    fn test_elements_to_blocks() {
        let elements: Vec<Element> = serde_json::from_str(
            r#"[
                {"type":"Title","text":"Report","metadata":{"page_number":1,"languages":["eng"]}},
                {"type":"NarrativeText","text":"  ","metadata":{}},
                {"type":"Table","text":"a b","metadata":{"page_number":2}}
            ]"#,
        )
        .unwrap();

        let blocks = to_blocks(elements);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].category, BlockCategory::Title);
        assert_eq!(blocks[0].languages, vec!["eng"]);
        assert_eq!(blocks[1].category, BlockCategory::Table);
        assert_eq!(blocks[1].page, Some(2));
    }
}
