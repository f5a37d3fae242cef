//! Local JSON document index.
//!
//! Stands in for the document database when running from the command line:
//! one `documents.json` file under the upload directory, keyed by content hash.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docrag_core::{DocragResult, DocumentMeta, DocumentStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const DOCUMENTS_FILE: &str = "documents.json";

/// A stored document record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DocumentIndex {
    #[serde(default)]
    documents: BTreeMap<String, StoredDocument>,
}

pub struct JsonDocumentStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the index file.
    lock: Mutex<()>,
}

impl JsonDocumentStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(DOCUMENTS_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored document, ordered by content hash.
    pub async fn list(&self) -> DocragResult<Vec<(String, StoredDocument)>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.documents.into_iter().collect())
    }

    /// Remove a record. Returns `false` if it was not present.
    pub async fn remove(&self, content_hash: &str) -> DocragResult<bool> {
        let _guard = self.lock.lock().await;
        let mut index = self.read().await?;
        if index.documents.remove(content_hash).is_none() {
            return Ok(false);
        }
        self.write(&index).await?;
        Ok(true)
    }

    async fn read(&self) -> DocragResult<DocumentIndex> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DocumentIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, index: &DocumentIndex) -> DocragResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(index)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn has_document(&self, content_hash: &str) -> DocragResult<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.documents.contains_key(content_hash))
    }

    async fn save_document(&self, content_hash: &str, meta: &DocumentMeta) -> DocragResult<()> {
        let _guard = self.lock.lock().await;
        let mut index = self.read().await?;
        index.documents.insert(
            content_hash.to_string(),
            StoredDocument {
                meta: meta.clone(),
                ingested_at: Utc::now(),
            },
        );
        self.write(&index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(title: &str) -> DocumentMeta {
        DocumentMeta {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_lookup() {
        let dir = TempDir::new().unwrap();
        let store = JsonDocumentStore::new(dir.path());
        assert!(!store.has_document("abc").await.unwrap());

        store.save_document("abc", &meta("Report")).await.unwrap();
        assert!(store.has_document("abc").await.unwrap());
        assert!(store.path().exists());

        let reopened = JsonDocumentStore::new(dir.path());
        let docs = reopened.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].0, "abc");
        assert_eq!(docs[0].1.meta.title, "Report");
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = JsonDocumentStore::new(dir.path());
        store.save_document("abc", &meta("Report")).await.unwrap();

        assert!(store.remove("abc").await.unwrap());
        assert!(!store.remove("abc").await.unwrap());
        assert!(!store.has_document("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DOCUMENTS_FILE), "not json").unwrap();
        let store = JsonDocumentStore::new(dir.path());
        assert!(store.has_document("abc").await.is_err());
    }
}
