//! In-memory vector store backend.
//!
//! Linear scan over every row of a collection. Intended for tests and
//! throwaway runs where a real database is not worth the setup.

use super::super::traits::{EmbeddingRecord, ScoredMatch, VectorMetric, VectorStoreBackend};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct StoredRow {
    id: i64,
    record: EmbeddingRecord,
}

#[derive(Debug, Default)]
struct MemoryCollection {
    dimension: usize,
    rows: Vec<StoredRow>,
    next_id: i64,
}

/// In-memory vector store.
///
/// Exposes a health toggle and operation counters so callers can observe
/// what reached the store.
#[derive(Debug)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    healthy: AtomicBool,
    created: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            created: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next health checks succeed or fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of collections created since construction.
    pub fn created_collections(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of insert calls that reached the store.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    fn read(
        &self,
    ) -> DbResult<std::sync::RwLockReadGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(
        &self,
    ) -> DbResult<std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl VectorStoreBackend for MemoryVectorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> DbResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::unavailable("memory store marked unhealthy"))
        }
    }

    async fn has_collection(&self, name: &str) -> DbResult<bool> {
        Ok(self.read()?.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> DbResult<()> {
        let mut collections = self.write()?;
        if collections.contains_key(name) {
            return Err(DbError::internal(format!("Collection '{}' already exists", name)));
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                rows: Vec::new(),
                next_id: 1,
            },
        );
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(collection = name, dimension, "Created memory collection");
        Ok(())
    }

    async fn collection_dimension(&self, name: &str) -> DbResult<usize> {
        self.read()?
            .get(name)
            .map(|c| c.dimension)
            .ok_or_else(|| DbError::collection_not_found(name))
    }

    async fn insert(&self, name: &str, records: &[EmbeddingRecord]) -> DbResult<usize> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| DbError::collection_not_found(name))?;

        for record in records {
            if record.vector.len() != collection.dimension {
                return Err(DbError::DimensionMismatch {
                    expected: collection.dimension,
                    actual: record.vector.len(),
                });
            }
        }

        for record in records {
            let id = collection.next_id;
            collection.next_id += 1;
            collection.rows.push(StoredRow {
                id,
                record: record.clone(),
            });
        }

        trace!(collection = name, count = records.len(), "Inserted rows");
        Ok(records.len())
    }

    async fn search(
        &self,
        name: &str,
        query: &[f32],
        limit: usize,
        metric: VectorMetric,
    ) -> DbResult<Vec<ScoredMatch>> {
        let collections = self.read()?;
        let collection = collections
            .get(name)
            .ok_or_else(|| DbError::collection_not_found(name))?;

        if query.len() != collection.dimension {
            return Err(DbError::DimensionMismatch {
                expected: collection.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, &StoredRow)> = collection
            .rows
            .iter()
            .map(|row| (metric.distance(query, &row.record.vector), row))
            .collect();

        // Closest first; ties keep insertion order.
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(distance, row)| ScoredMatch {
                id: row.id,
                number: Some(row.record.number),
                text: Some(row.record.text.clone()),
                metadata: Some(row.record.metadata.clone()),
                distance,
                score: metric.similarity(distance),
            })
            .collect())
    }

    async fn drop_collection(&self, name: &str) -> DbResult<()> {
        self.write()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::collection_not_found(name))
    }

    async fn count(&self, name: &str) -> DbResult<usize> {
        self.read()?
            .get(name)
            .map(|c| c.rows.len())
            .ok_or_else(|| DbError::collection_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let store = MemoryVectorStore::new();
        store.create_collection("c", 3).await.unwrap();
        store
            .insert(
                "c",
                &[
                    EmbeddingRecord::new(1, "x", unit(3, 0)),
                    EmbeddingRecord::new(2, "y", unit(3, 1)),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("c", &unit(3, 1), 5, VectorMetric::L2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].number, Some(2));
        assert_eq!(hits[0].id, 2);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let store = MemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store.insert("c", &[EmbeddingRecord::new(1, "a", vec![1.0, 0.0])]).await.unwrap();
        store.insert("c", &[EmbeddingRecord::new(2, "b", vec![0.0, 1.0])]).await.unwrap();

        let mut ids: Vec<i64> = store
            .search("c", &[1.0, 0.0], 10, VectorMetric::Cosine)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.count("c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_collection_errors() {
        let store = MemoryVectorStore::new();
        assert!(matches!(
            store.count("nope").await,
            Err(DbError::CollectionNotFound { .. })
        ));
        assert!(store.drop_collection("nope").await.is_err());
    }
}
