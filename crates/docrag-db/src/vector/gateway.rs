//! Per-document collection gateway.
//!
//! Wraps a [`VectorStoreBackend`] and converts every failure into a soft
//! sentinel (`false` or an empty result) after logging it, so orchestration
//! code only has to ask "did this succeed".

use super::config::{Environment, TEXT_MAX_CHARS};
use super::traits::{EmbeddingRecord, OutputField, ScoredMatch, VectorMetric, VectorStoreBackend};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SearchOutcome
// ============================================================================

/// Search results split by a similarity threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Everything the store returned, in store order.
    pub data: Vec<ScoredMatch>,
    /// The subset with `score >= threshold`, in store order.
    pub matched: Vec<ScoredMatch>,
}

impl SearchOutcome {
    pub fn partition(matches: Vec<ScoredMatch>, threshold: f32) -> Self {
        let matched = matches
            .iter()
            .filter(|m| m.score >= threshold)
            .cloned()
            .collect();
        Self {
            data: matches,
            matched,
        }
    }

    /// Texts of the confident matches.
    pub fn matched_texts(&self) -> Vec<&str> {
        self.matched.iter().filter_map(|m| m.text.as_deref()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ============================================================================
// VectorStoreGateway
// ============================================================================

/// Collection lifecycle, insertion and search against one vector store.
#[derive(Clone)]
pub struct VectorStoreGateway {
    backend: Arc<dyn VectorStoreBackend>,
    environment: Environment,
    health_timeout: Duration,
}

impl std::fmt::Debug for VectorStoreGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreGateway")
            .field("backend", &self.backend.name())
            .field("environment", &self.environment)
            .finish()
    }
}

impl VectorStoreGateway {
    pub fn new(backend: Arc<dyn VectorStoreBackend>, environment: Environment) -> Self {
        Self {
            backend,
            environment,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn backend(&self) -> &Arc<dyn VectorStoreBackend> {
        &self.backend
    }

    /// Health precondition shared by every operation.
    async fn healthy(&self, operation: &str) -> bool {
        match tokio::time::timeout(self.health_timeout, self.backend.health_check()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(operation, backend = self.backend.name(), error = %e, "Vector store unhealthy");
                false
            }
            Err(_) => {
                warn!(
                    operation,
                    backend = self.backend.name(),
                    timeout_secs = self.health_timeout.as_secs(),
                    "Vector store health check timed out"
                );
                false
            }
        }
    }

    pub async fn has_collection(&self, name: &str) -> bool {
        if !self.healthy("has_collection").await {
            return false;
        }
        match self.backend.has_collection(name).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(collection = name, error = %e, "Failed to check collection");
                false
            }
        }
    }

    /// Make sure `name` exists with vectors of `dimension`.
    ///
    /// Existing collections are never altered; one created with a different
    /// dimension makes this return `false`.
    pub async fn ensure_collection(&self, name: &str, dimension: usize) -> bool {
        if !self.healthy("ensure_collection").await {
            return false;
        }

        match self.backend.has_collection(name).await {
            Ok(true) => return self.dimension_matches(name, dimension).await,
            Ok(false) => {}
            Err(e) => {
                error!(collection = name, error = %e, "Failed to check collection");
                return false;
            }
        }

        match self.backend.create_collection(name, dimension).await {
            Ok(()) => {
                info!(collection = name, dimension, "Created collection");
                true
            }
            Err(e) => {
                // A concurrent ingest of the same content may have won the race.
                if matches!(self.backend.has_collection(name).await, Ok(true)) {
                    debug!(collection = name, "Collection appeared during create");
                    return self.dimension_matches(name, dimension).await;
                }
                error!(collection = name, dimension, error = %e, "Failed to create collection");
                false
            }
        }
    }

    async fn dimension_matches(&self, name: &str, dimension: usize) -> bool {
        match self.backend.collection_dimension(name).await {
            Ok(existing) if existing == dimension => true,
            Ok(existing) => {
                warn!(
                    collection = name,
                    expected = existing,
                    actual = dimension,
                    "Collection exists with a different dimension"
                );
                false
            }
            Err(e) => {
                error!(collection = name, error = %e, "Failed to read collection dimension");
                false
            }
        }
    }

    /// Insert records into an existing collection.
    ///
    /// Every vector is checked against the collection dimension first; a
    /// single mismatch rejects the whole call before anything reaches the store.
    pub async fn insert(&self, name: &str, records: &[EmbeddingRecord]) -> bool {
        if !self.healthy("insert").await {
            return false;
        }
        if records.is_empty() {
            return true;
        }

        let dimension = match self.backend.collection_dimension(name).await {
            Ok(d) => d,
            Err(e) => {
                error!(collection = name, error = %e, "Insert target unavailable");
                return false;
            }
        };

        if let Some(bad) = records.iter().find(|r| r.vector.len() != dimension) {
            warn!(
                collection = name,
                number = bad.number,
                expected = dimension,
                actual = bad.vector.len(),
                "Rejected insert with mismatched vector dimension"
            );
            return false;
        }

        let prepared: Vec<EmbeddingRecord> = records.iter().map(truncate_text).collect();

        match self.backend.insert(name, &prepared).await {
            Ok(written) if written == prepared.len() => {
                debug!(collection = name, count = written, "Inserted records");
                true
            }
            Ok(written) => {
                error!(
                    collection = name,
                    expected = prepared.len(),
                    written,
                    "Store wrote fewer rows than requested"
                );
                false
            }
            Err(e) => {
                error!(collection = name, count = prepared.len(), error = %e, "Insert failed");
                false
            }
        }
    }

    /// Nearest neighbours of `query`, in store order, limited to `fields`.
    pub async fn search(
        &self,
        name: &str,
        query: &[f32],
        fields: &[OutputField],
        limit: usize,
        metric: VectorMetric,
    ) -> Vec<ScoredMatch> {
        if !self.healthy("search").await {
            return Vec::new();
        }

        match self.backend.search(name, query, limit, metric).await {
            Ok(matches) => {
                debug!(collection = name, hits = matches.len(), %metric, "Search complete");
                matches.into_iter().map(|m| m.project(fields)).collect()
            }
            Err(e) => {
                error!(collection = name, error = %e, "Search failed");
                Vec::new()
            }
        }
    }

    /// Drop a collection. Refused in production; a missing collection counts
    /// as already deleted.
    pub async fn delete_collection(&self, name: &str) -> bool {
        if !self.environment.allows_drop() {
            warn!(collection = name, "Refusing to drop collection in production");
            return false;
        }
        if !self.healthy("delete_collection").await {
            return false;
        }

        match self.backend.has_collection(name).await {
            Ok(false) => return true,
            Ok(true) => {}
            Err(e) => {
                error!(collection = name, error = %e, "Failed to check collection");
                return false;
            }
        }

        match self.backend.drop_collection(name).await {
            Ok(()) => {
                info!(collection = name, "Dropped collection");
                true
            }
            Err(e) => {
                error!(collection = name, error = %e, "Failed to drop collection");
                false
            }
        }
    }

    /// Row count, or `None` when the store cannot answer.
    pub async fn count(&self, name: &str) -> Option<usize> {
        if !self.healthy("count").await {
            return None;
        }
        self.backend
            .count(name)
            .await
            .map_err(|e| debug!(collection = name, error = %e, "Count failed"))
            .ok()
    }
}

fn truncate_text(record: &EmbeddingRecord) -> EmbeddingRecord {
    let mut record = record.clone();
    if record.text.chars().count() > TEXT_MAX_CHARS {
        record.text = record.text.chars().take(TEXT_MAX_CHARS).collect();
    }
    record
}
