//! Plain text and delimited (CSV/TSV) loaders.

use std::path::Path;

use super::{BlockCategory, LoadedDocument, RawBlock};
use crate::errors::{DocragError, DocragResult};

/// The whole file as one block.
pub(super) fn load_plain(path: &Path) -> DocragResult<LoadedDocument> {
    let bytes = std::fs::read(path).map_err(|e| DocragError::load(path, e.to_string()))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(LoadedDocument::from_blocks(vec![RawBlock::new(text.trim())]))
}

/// One block per row, rendered as `header: value` lines.
pub(super) fn load_delimited(path: &Path, delimiter: u8) -> DocragResult<LoadedDocument> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| DocragError::load(path, e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DocragError::load(path, format!("unreadable header row: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut blocks = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| DocragError::load(path, format!("row {}: {e}", i + 1)))?;
        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(col, value)| match headers.get(col).filter(|h| !h.is_empty()) {
                Some(header) => format!("{header}: {}", value.trim()),
                None => value.trim().to_string(),
            })
            .collect();
        if lines.is_empty() {
            continue;
        }
        blocks.push(
            RawBlock::new(lines.join("\n"))
                .with_category(BlockCategory::Row)
                .with_location(format!("row {}", i + 1)),
        );
    }

    Ok(LoadedDocument::from_blocks(blocks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows_with_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name,bio\nAda,\"Wrote, notes\"\n,\nBob,Builder\n").unwrap();

        let doc = load_delimited(&path, b',').unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[0].text, "name: Ada\nbio: Wrote, notes");
        assert_eq!(doc.blocks[0].location.as_deref(), Some("row 1"));
        assert_eq!(doc.blocks[1].location.as_deref(), Some("row 3"));
    }

    #[test]
    fn test_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tsv");
        std::fs::write(&path, "k\tv\na\tb\n").unwrap();

        let doc = load_delimited(&path, b'\t').unwrap();
        assert_eq!(doc.blocks[0].text, "k: a\nv: b");
    }

    #[test]
    fn test_plain_text_is_one_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "\n Title line\n\nBody one.\n").unwrap();

        let doc = load_plain(&path).unwrap();
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].text, "Title line\n\nBody one.");
    }
}
