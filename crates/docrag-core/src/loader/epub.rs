//! EPUB loader.
//!
//! Follows `META-INF/container.xml` to the OPF package, reads chapters in
//! spine order and converts each XHTML chapter to Markdown.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use super::{xml_element, xml_elements, BlockCategory, LoadedDocument, LoaderMetadata, RawBlock};
use crate::errors::{DocragError, DocragResult};

struct ManifestItem {
    href: String,
    properties: Option<String>,
}

pub(super) fn load(path: &Path) -> DocragResult<LoadedDocument> {
    let bytes = std::fs::read(path).map_err(|e| DocragError::load(path, e.to_string()))?;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DocragError::load(path, format!("not an EPUB archive: {e}")))?;

    let container = read_entry(&mut archive, "META-INF/container.xml")
        .ok_or_else(|| DocragError::load(path, "META-INF/container.xml missing"))?;
    let opf_path = attribute(&container, "rootfile", "full-path")
        .into_iter()
        .next()
        .ok_or_else(|| DocragError::load(path, "container has no rootfile"))?;
    let opf = read_entry(&mut archive, &opf_path)
        .ok_or_else(|| DocragError::load(path, format!("package {opf_path} missing")))?;
    let base = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

    let manifest = manifest(&opf);
    let spine = attribute(&opf, "itemref", "idref");

    let mut blocks = Vec::new();
    for idref in &spine {
        let Some(item) = manifest.get(idref) else {
            warn!(idref, "Spine references unknown manifest item");
            continue;
        };
        let href = join(base, &item.href);
        let Some(xhtml) = read_entry(&mut archive, &href) else {
            warn!(href, "Chapter missing from archive");
            continue;
        };
        let markdown = htmd::convert(&xhtml)
            .map_err(|e| DocragError::load(path, format!("Failed to convert {href}: {e}")))?;
        if !markdown.trim().is_empty() {
            blocks.push(
                RawBlock::new(markdown.trim())
                    .with_category(BlockCategory::Chapter)
                    .with_location(href),
            );
        }
    }

    let metadata = LoaderMetadata {
        title: xml_element(&opf, "dc:title"),
        authors: xml_elements(&opf, "dc:creator"),
        cover_url: cover_href(&opf, &manifest).map(|href| join(base, &href)),
    };

    debug!(path = %path.display(), chapters = blocks.len(), "Read EPUB");
    Ok(LoadedDocument { blocks, metadata })
}

fn read_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    Some(content)
}

/// Values of `attr` on every `<tag ...>` element.
fn attribute(xml: &str, tag: &str, attr: &str) -> Vec<String> {
    let pattern = format!(
        r#"<(?:\w+:)?{tag}\b[^>]*\s{attr}\s*=\s*"([^"]*)""#,
        tag = regex::escape(tag),
        attr = regex::escape(attr)
    );
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures_iter(xml)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn manifest(opf: &str) -> HashMap<String, ManifestItem> {
    let (Ok(item), Ok(attr)) = (
        Regex::new(r"<(?:\w+:)?item\b[^>]*>"),
        Regex::new(r#"([\w:-]+)\s*=\s*"([^"]*)""#),
    ) else {
        return HashMap::new();
    };

    item.find_iter(opf)
        .filter_map(|m| {
            let attrs: HashMap<&str, &str> = attr
                .captures_iter(m.as_str())
                .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
                .collect();
            let id = attrs.get("id")?.to_string();
            let href = attrs.get("href")?.to_string();
            Some((
                id,
                ManifestItem {
                    href,
                    properties: attrs.get("properties").map(|p| p.to_string()),
                },
            ))
        })
        .collect()
}

/// EPUB 3 `cover-image` property, else the EPUB 2 `<meta name="cover">` item.
fn cover_href(opf: &str, manifest: &HashMap<String, ManifestItem>) -> Option<String> {
    if let Some(item) = manifest.values().find(|i| {
        i.properties
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|p| p == "cover-image"))
    }) {
        return Some(item.href.clone());
    }

    let re = Regex::new(r#"<meta\b[^>]*name\s*=\s*"cover"[^>]*content\s*=\s*"([^"]*)""#).ok()?;
    let id = re.captures(opf)?.get(1)?.as_str();
    manifest.get(id).map(|i| i.href.clone())
}

fn join(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{base}/{href}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sea Stories</dc:title>
    <dc:creator>J. Conrad</dc:creator>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="c2" href="text/two.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="text/one.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="c2"/>
  </spine>
</package>"#;

    fn write_epub(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        let entries = [
            (
                "META-INF/container.xml",
                r#"<container><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#,
            ),
            ("OEBPS/content.opf", OPF),
            ("OEBPS/text/one.xhtml", "<html><body><h1>One</h1><p>First chapter.</p></body></html>"),
            ("OEBPS/text/two.xhtml", "<html><body><p>Second chapter.</p></body></html>"),
        ];
        for (name, content) in entries {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_chapters_follow_spine_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        write_epub(&path);

        let doc = load(&path).unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert!(doc.blocks[0].text.contains("First chapter."));
        assert!(doc.blocks[1].text.contains("Second chapter."));
        assert_eq!(doc.blocks[0].location.as_deref(), Some("OEBPS/text/one.xhtml"));
        assert_eq!(doc.metadata.title.as_deref(), Some("Sea Stories"));
        assert_eq!(doc.metadata.authors, vec!["J. Conrad"]);
        assert_eq!(doc.metadata.cover_url.as_deref(), Some("OEBPS/images/cover.jpg"));
    }

    #[test]
    fn test_attribute_extraction() {
        assert_eq!(attribute(OPF, "itemref", "idref"), vec!["c1", "c2"]);
    }
}
