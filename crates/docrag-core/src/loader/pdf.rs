//! PDF loader: one block per page.

use std::path::Path;

use tracing::debug;

use super::{BlockCategory, LoadedDocument, RawBlock};
use crate::errors::{DocragError, DocragResult};

pub(super) fn load(path: &Path) -> DocragResult<LoadedDocument> {
    let bytes = std::fs::read(path).map_err(|e| DocragError::load(path, e.to_string()))?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| DocragError::load(path, format!("PDF extraction failed: {e}")))?;

    let blocks = pages(&text);
    debug!(path = %path.display(), pages = blocks.len(), "Extracted PDF text");
    Ok(LoadedDocument::from_blocks(blocks))
}

/// Split extracted text on form feeds; blank pages are skipped but still counted.
fn pages(text: &str) -> Vec<RawBlock> {
    text.split('\x0C')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| {
            RawBlock::new(page.trim())
                .with_category(BlockCategory::Page)
                .with_page(i as u32 + 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_split_on_form_feed() {
        let blocks = pages("first page\x0C\x0C third page \x0C");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].page, Some(1));
        assert_eq!(blocks[1].text, "third page");
        assert_eq!(blocks[1].page, Some(3));
    }

    #[test]
    fn test_corrupt_pdf_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        assert!(matches!(load(&path), Err(DocragError::Load { .. })));
    }
}
