//! LanceDB vector store backend.
//!
//! One LanceDB table per collection. Works against a local directory or,
//! with the `remote` feature, a `db://` URI authenticated by API key.

use super::super::traits::{EmbeddingRecord, ScoredMatch, VectorMetric, VectorStoreBackend};
use crate::error::{DbError, DbResult};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::{
    connect,
    query::{ExecutableQuery, QueryBase},
    Connection, DistanceType, Table,
};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

/// LanceDB vector store.
///
/// The connection is opened on first use so constructing the store never
/// touches the network or the filesystem.
pub struct LanceDbVectorStore {
    uri: String,
    api_key: Option<String>,
    connection: OnceCell<Connection>,
}

impl LanceDbVectorStore {
    pub fn new(uri: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            api_key,
            connection: OnceCell::new(),
        }
    }

    async fn connection(&self) -> DbResult<&Connection> {
        self.connection
            .get_or_try_init(|| async {
                debug!(uri = %self.uri, "Connecting to LanceDB");
                #[allow(unused_mut)]
                let mut builder = connect(&self.uri);

                #[cfg(feature = "remote")]
                if let Some(key) = &self.api_key {
                    builder = builder.api_key(key);
                }

                #[cfg(not(feature = "remote"))]
                if self.api_key.is_some() {
                    warn!("Vector store API key ignored: built without the 'remote' feature");
                }

                builder.execute().await.map_err(|e| DbError::LanceDb {
                    message: format!("Failed to connect to '{}': {}", self.uri, e),
                })
            })
            .await
    }

    async fn open_table(&self, name: &str) -> DbResult<Table> {
        let connection = self.connection().await?;
        if !self.has_collection(name).await? {
            return Err(DbError::collection_not_found(name));
        }
        connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to open table '{}': {}", name, e),
            })
    }

    /// Fixed collection schema.
    fn schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("number", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("metadata", DataType::Utf8, true),
        ])
    }

    /// Build a batch from records; `first_id` is assigned to the first row.
    fn records_to_batch(
        records: &[EmbeddingRecord],
        dimension: usize,
        first_id: i64,
    ) -> DbResult<RecordBatch> {
        let schema = Self::schema(dimension);

        let ids: ArrayRef = Arc::new(Int64Array::from(
            (0..records.len() as i64).map(|i| first_id + i).collect::<Vec<_>>(),
        ));

        let numbers: ArrayRef = Arc::new(Int32Array::from(
            records.iter().map(|r| r.number as i32).collect::<Vec<_>>(),
        ));

        let texts: ArrayRef = Arc::new(StringArray::from(
            records.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
        ));

        let flat: Vec<f32> = records.iter().flat_map(|r| r.vector.iter().copied()).collect();
        let vector_array =
            FixedSizeListArray::try_new_from_values(Float32Array::from(flat), dimension as i32)
                .map_err(|e| DbError::internal(format!("Failed to create vector array: {}", e)))?;
        let embeddings: ArrayRef = Arc::new(vector_array);

        let metadata: ArrayRef = Arc::new(StringArray::from(
            records
                .iter()
                .map(|r| serde_json::to_string(&r.metadata).ok())
                .collect::<Vec<_>>(),
        ));

        RecordBatch::try_new(
            Arc::new(schema),
            vec![ids, numbers, texts, embeddings, metadata],
        )
        .map_err(|e| DbError::internal(format!("Failed to create batch: {}", e)))
    }
}

fn distance_type(metric: VectorMetric) -> DistanceType {
    match metric {
        VectorMetric::L2 => DistanceType::L2,
        VectorMetric::Cosine => DistanceType::Cosine,
        VectorMetric::Dot => DistanceType::Dot,
    }
}

#[async_trait]
impl VectorStoreBackend for LanceDbVectorStore {
    fn name(&self) -> &'static str {
        "lancedb"
    }

    async fn health_check(&self) -> DbResult<()> {
        let connection = self.connection().await?;
        connection
            .table_names()
            .execute()
            .await
            .map(|_| ())
            .map_err(|e| DbError::unavailable(format!("LanceDB not reachable: {}", e)))
    }

    async fn has_collection(&self, name: &str) -> DbResult<bool> {
        let names = self
            .connection()
            .await?
            .table_names()
            .execute()
            .await
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to list tables: {}", e),
            })?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> DbResult<()> {
        debug!(collection = name, dimension, "Creating LanceDB table");
        let schema = Arc::new(Self::schema(dimension));
        let empty = Self::records_to_batch(&[], dimension, 1)?;
        let batches = RecordBatchIterator::new(vec![Ok(empty)], schema);

        self.connection()
            .await?
            .create_table(name, Box::new(batches))
            .execute()
            .await
            .map(|_| ())
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to create table '{}': {}", name, e),
            })
    }

    async fn collection_dimension(&self, name: &str) -> DbResult<usize> {
        let table = self.open_table(name).await?;
        let schema = table.schema().await?;
        let field = schema
            .field_with_name("embedding")
            .map_err(|e| DbError::internal(format!("Table '{}' has no embedding: {}", name, e)))?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) => Ok(*size as usize),
            other => Err(DbError::internal(format!(
                "Unexpected embedding type in '{}': {:?}",
                name, other
            ))),
        }
    }

    async fn insert(&self, name: &str, records: &[EmbeddingRecord]) -> DbResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let table = self.open_table(name).await?;
        let dimension = records[0].vector.len();
        let existing = table.count_rows(None).await?;
        let batch = Self::records_to_batch(records, dimension, existing as i64 + 1)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| DbError::LanceDb {
                message: format!("Insert into '{}' failed: {}", name, e),
            })?;

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
        let table = self.open_table(name).await?;

        let results = table
            .vector_search(query.to_vec())
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to create query: {}", e),
            })?
            .column("embedding")
            .distance_type(distance_type(metric))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| DbError::LanceDb {
                message: format!("Query failed: {}", e),
            })?;

        let batches: Vec<RecordBatch> = results.try_collect().await.map_err(|e| DbError::LanceDb {
            message: format!("Failed to collect results: {}", e),
        })?;

        let mut matches = Vec::new();
        for batch in batches {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>());
            let numbers = batch
                .column_by_name("number")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>());
            let texts = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let metadata = batch
                .column_by_name("metadata")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            let (Some(ids), Some(numbers), Some(texts), Some(metadata), Some(distances)) =
                (ids, numbers, texts, metadata, distances)
            else {
                warn!(collection = name, "Search batch missing expected columns");
                continue;
            };

            for i in 0..batch.num_rows() {
                let meta = if metadata.is_null(i) {
                    serde_json::Value::Null
                } else {
                    serde_json::from_str(metadata.value(i)).unwrap_or(serde_json::Value::Null)
                };
                let distance = distances.value(i);
                matches.push(ScoredMatch {
                    id: ids.value(i),
                    number: Some(numbers.value(i) as u32),
                    text: Some(texts.value(i).to_string()),
                    metadata: Some(meta),
                    distance,
                    score: metric.similarity(distance),
                });
            }
        }

        Ok(matches)
    }

    async fn drop_collection(&self, name: &str) -> DbResult<()> {
        self.connection()
            .await?
            .drop_table(name, &[])
            .await
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to drop table '{}': {}", name, e),
            })
    }

    async fn count(&self, name: &str) -> DbResult<usize> {
        let table = self.open_table(name).await?;
        Ok(table.count_rows(None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_fields() {
        let schema = LanceDbVectorStore::schema(4);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["id", "number", "text", "embedding", "metadata"]);
    }

    #[test]
    fn test_records_to_batch_assigns_ids() {
        let records = vec![
            EmbeddingRecord::new(1, "a", vec![0.0; 4]),
            EmbeddingRecord::new(2, "b", vec![1.0; 4]),
        ];
        let batch = LanceDbVectorStore::records_to_batch(&records, 4, 10).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .unwrap();
        assert_eq!(ids.value(0), 10);
        assert_eq!(ids.value(1), 11);
    }

    #[tokio::test]
    async fn test_local_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceDbVectorStore::new(dir.path().to_string_lossy(), None);

        store.health_check().await.unwrap();
        assert!(!store.has_collection("DOCRAG_T").await.unwrap());

        store.create_collection("DOCRAG_T", 2).await.unwrap();
        assert_eq!(store.collection_dimension("DOCRAG_T").await.unwrap(), 2);

        store
            .insert(
                "DOCRAG_T",
                &[
                    EmbeddingRecord::new(1, "x", vec![1.0, 0.0]),
                    EmbeddingRecord::new(2, "y", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count("DOCRAG_T").await.unwrap(), 2);

        let hits = store
            .search("DOCRAG_T", &[0.0, 1.0], 1, VectorMetric::L2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text.as_deref(), Some("y"));

        store.drop_collection("DOCRAG_T").await.unwrap();
        assert!(!store.has_collection("DOCRAG_T").await.unwrap());
    }
}
