//! Vector store traits and core types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DbResult;

// ============================================================================
// VectorMetric
// ============================================================================

/// Distance metric for similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMetric {
    /// Squared Euclidean distance (default).
    #[default]
    L2,
    /// Cosine distance (`1 - cos`).
    Cosine,
    /// Dot distance (`1 - dot`).
    Dot,
}

impl VectorMetric {
    /// Get the metric name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMetric::L2 => "l2",
            VectorMetric::Cosine => "cosine",
            VectorMetric::Dot => "dot",
        }
    }

    /// Distance between two vectors as the store computes it.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            VectorMetric::L2 => squared_euclidean(a, b),
            VectorMetric::Cosine => 1.0 - cosine_similarity(a, b),
            VectorMetric::Dot => 1.0 - dot_product(a, b),
        }
    }

    /// Convert a store distance into a similarity score (higher is closer).
    ///
    /// For L2 this assumes unit-length vectors, where `d = 2 - 2cos`.
    pub fn similarity(&self, distance: f32) -> f32 {
        match self {
            VectorMetric::L2 => 1.0 - distance / 2.0,
            VectorMetric::Cosine | VectorMetric::Dot => 1.0 - distance,
        }
    }
}

impl std::fmt::Display for VectorMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VectorMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            "dot" | "ip" => Ok(Self::Dot),
            _ => Err(format!("Unknown metric: '{}'. Use 'l2', 'cosine' or 'dot'.", s)),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

// ============================================================================
// EmbeddingRecord
// ============================================================================

/// The unit stored in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// 1-based position within the source document.
    pub number: u32,
    pub text: String,
    pub vector: Vec<f32>,
    /// Free-form metadata (file type, filename, title).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EmbeddingRecord {
    pub fn new(number: u32, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            number,
            text: text.into(),
            vector,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// Search results
// ============================================================================

/// Fields a search may return besides id and score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputField {
    Number,
    Text,
    Metadata,
}

impl OutputField {
    pub const ALL: [OutputField; 3] = [OutputField::Number, OutputField::Text, OutputField::Metadata];
}

/// One search hit. Fields not requested are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    /// Store-assigned primary key.
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Raw distance reported by the store.
    pub distance: f32,
    /// Similarity derived from `distance` (higher is closer).
    pub score: f32,
}

impl ScoredMatch {
    /// Drop the fields that were not requested.
    pub fn project(mut self, fields: &[OutputField]) -> Self {
        if !fields.contains(&OutputField::Number) {
            self.number = None;
        }
        if !fields.contains(&OutputField::Text) {
            self.text = None;
        }
        if !fields.contains(&OutputField::Metadata) {
            self.metadata = None;
        }
        self
    }
}

// ============================================================================
// VectorStoreBackend Trait
// ============================================================================

/// Raw collection operations provided by a vector database.
///
/// Backends report failures as errors; the gateway turns them into the
/// boolean and empty-result sentinels its callers expect.
#[async_trait]
pub trait VectorStoreBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Succeeds when the service is reachable.
    async fn health_check(&self) -> DbResult<()>;

    async fn has_collection(&self, name: &str) -> DbResult<bool>;

    /// Create a collection with the fixed schema and `dimension`-wide vectors.
    async fn create_collection(&self, name: &str, dimension: usize) -> DbResult<()>;

    /// Vector dimension the collection was created with.
    async fn collection_dimension(&self, name: &str) -> DbResult<usize>;

    /// Append records; ids are assigned by the store. Returns rows written.
    async fn insert(&self, name: &str, records: &[EmbeddingRecord]) -> DbResult<usize>;

    /// Nearest neighbours, best first, with every field populated.
    async fn search(
        &self,
        name: &str,
        query: &[f32],
        limit: usize,
        metric: VectorMetric,
    ) -> DbResult<Vec<ScoredMatch>>;

    async fn drop_collection(&self, name: &str) -> DbResult<()>;

    async fn count(&self, name: &str) -> DbResult<usize>;
}
