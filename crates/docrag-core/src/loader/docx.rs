//! DOCX loader.
//!
//! A DOCX file is a ZIP archive; paragraphs come from `word/document.xml`
//! (`<w:p>` elements, text in `<w:t>` runs) and title/author from
//! `docProps/core.xml`.

use std::io::{Cursor, Read};
use std::path::Path;

use regex::Regex;

use super::{decode_entities, xml_element, xml_elements, BlockCategory, LoadedDocument, LoaderMetadata, RawBlock};
use crate::errors::{DocragError, DocragResult};

pub(super) fn load(path: &Path) -> DocragResult<LoadedDocument> {
    let bytes = std::fs::read(path).map_err(|e| DocragError::load(path, e.to_string()))?;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DocragError::load(path, format!("not a DOCX archive: {e}")))?;

    let document = read_entry(&mut archive, "word/document.xml")
        .ok_or_else(|| DocragError::load(path, "word/document.xml missing"))?;

    let mut metadata = LoaderMetadata::default();
    if let Some(core) = read_entry(&mut archive, "docProps/core.xml") {
        metadata.title = xml_element(&core, "dc:title");
        metadata.authors = xml_elements(&core, "dc:creator");
    }

    Ok(LoadedDocument {
        blocks: paragraphs(&document),
        metadata,
    })
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    Some(content)
}

/// One block per non-empty paragraph. Heading styles become titles.
fn paragraphs(xml: &str) -> Vec<RawBlock> {
    let (Ok(paragraph), Ok(run)) = (
        Regex::new(r"(?s)<w:p[ >].*?</w:p>"),
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>"),
    ) else {
        return Vec::new();
    };

    paragraph
        .find_iter(xml)
        .filter_map(|p| {
            let body = p.as_str();
            let text: String = run
                .captures_iter(body)
                .filter_map(|c| c.get(1))
                .map(|m| decode_entities(m.as_str()))
                .collect();
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let category = if body.contains(r#"w:val="Title""#) || body.contains(r#"w:val="Heading"#) {
                BlockCategory::Title
            } else {
                BlockCategory::Body
            };
            Some(RawBlock::new(text).with_category(category))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_docx(path: &Path, document: &str, core: Option<&str>) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        if let Some(core) = core {
            zip.start_file("docProps/core.xml", options).unwrap();
            zip.write_all(core.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_paragraphs_and_core_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.docx");
        write_docx(
            &path,
            r#"<w:document><w:body>
                <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>
                <w:p><w:r><w:t xml:space="preserve">Fish </w:t></w:r><w:r><w:t>&amp; chips</w:t></w:r></w:p>
                <w:p></w:p>
            </w:body></w:document>"#,
            Some("<cp:coreProperties><dc:title>Menu</dc:title><dc:creator>Ann</dc:creator></cp:coreProperties>"),
        );

        let doc = load(&path).unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[0].category, BlockCategory::Title);
        assert_eq!(doc.blocks[1].text, "Fish & chips");
        assert_eq!(doc.metadata.title.as_deref(), Some("Menu"));
        assert_eq!(doc.metadata.authors, vec!["Ann"]);
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.docx");
        std::fs::write(&path, "plain").unwrap();
        assert!(matches!(load(&path), Err(DocragError::Load { .. })));
    }
}
