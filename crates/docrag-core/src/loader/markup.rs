//! Local Markdown and HTML loaders, used when the layout extraction
//! service is not configured.

use std::path::Path;

use super::{BlockCategory, LoadedDocument, LoaderMetadata, RawBlock};
use crate::errors::{DocragError, DocragResult};

pub(super) fn load_markdown(path: &Path) -> DocragResult<LoadedDocument> {
    let text = std::fs::read_to_string(path).map_err(|e| DocragError::load(path, e.to_string()))?;
    Ok(LoadedDocument::from_blocks(sections(&text)))
}

pub(super) fn load_html(path: &Path) -> DocragResult<LoadedDocument> {
    let html = std::fs::read_to_string(path).map_err(|e| DocragError::load(path, e.to_string()))?;
    let title = super::xml_element(&html, "title");
    let markdown = htmd::convert(&html)
        .map_err(|e| DocragError::load(path, format!("Failed to convert HTML: {e}")))?;

    Ok(LoadedDocument {
        blocks: sections(&markdown),
        metadata: LoaderMetadata {
            title,
            ..Default::default()
        },
    })
}

/// Split Markdown at headings; each heading starts a new block.
fn sections(markdown: &str) -> Vec<RawBlock> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in markdown.lines() {
        if line.trim_start().starts_with('#') && !current.trim().is_empty() {
            flush(&mut current, &mut blocks);
        }
        current.push_str(line);
        current.push('\n');
    }
    flush(&mut current, &mut blocks);

    blocks
}

fn flush(current: &mut String, blocks: &mut Vec<RawBlock>) {
    let text = current.trim();
    if !text.is_empty() {
        let category = if text.starts_with('#') && !text.contains('\n') {
            BlockCategory::Title
        } else {
            BlockCategory::Body
        };
        blocks.push(RawBlock::new(text).with_category(category));
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_sections() {
        let blocks = sections("# Title\nintro\n\n## Part\nbody\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "# Title\nintro");
        assert_eq!(blocks[1].text, "## Part\nbody");
    }

    #[test]
    fn test_html_title_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.html");
        std::fs::write(
            &path,
            "<html><head><title>Page</title></head><body><h1>Head</h1><p>Text here.</p></body></html>",
        )
        .unwrap();

        let doc = load_html(&path).unwrap();
        assert_eq!(doc.metadata.title.as_deref(), Some("Page"));
        assert!(doc.blocks.iter().any(|b| b.text.contains("Text here.")));
    }
}
