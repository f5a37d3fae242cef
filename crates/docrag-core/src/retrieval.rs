//! Conversational retrieval: question in, answer grounded in one document out.

use std::time::Duration;

use docrag_db::vector::{
    collection_name, OutputField, SearchOutcome, VectorMetric, VectorStoreConfig, VectorStoreGateway,
};
use moka::future::Cache;
use tracing::{debug, error, info};

use crate::embedder::EmbeddingGenerator;
use crate::errors::DocragResult;
use crate::generation::GenerationService;

// ============================================================================
// ResponseCache
// ============================================================================

/// Answers keyed by `(document id, question)`, bounded and expiring.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    inner: Cache<(String, String), String>,
}

impl ResponseCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
        }
    }

    pub async fn get(&self, document_id: &str, question: &str) -> Option<String> {
        self.inner
            .get(&(document_id.to_string(), question.to_string()))
            .await
    }

    pub async fn insert(&self, document_id: &str, question: &str, answer: String) {
        self.inner
            .insert((document_id.to_string(), question.to_string()), answer)
            .await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Apply pending expirations now.
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(512, Duration::from_secs(10 * 60))
    }
}

// ============================================================================
// ConversationalRetrievalService
// ============================================================================

#[derive(Debug, Clone)]
pub struct ConversationalRetrievalService {
    embedder: EmbeddingGenerator,
    gateway: VectorStoreGateway,
    generation: GenerationService,
    cache: ResponseCache,
    search_limit: usize,
    similarity_threshold: f32,
    metric: VectorMetric,
}

impl ConversationalRetrievalService {
    pub fn new(
        embedder: EmbeddingGenerator,
        gateway: VectorStoreGateway,
        generation: GenerationService,
        cache: ResponseCache,
        store: &VectorStoreConfig,
    ) -> Self {
        Self {
            embedder,
            gateway,
            generation,
            cache,
            search_limit: store.search_limit.max(1),
            similarity_threshold: store.similarity_threshold,
            metric: store.metric,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Top matches for a question within one document, split by the
    /// similarity threshold.
    pub async fn search(&self, question: &str, document_id: &str) -> DocragResult<SearchOutcome> {
        let collection = collection_name(document_id)?;
        let query = self.embedder.embed_query(question).await?;
        let matches = self
            .gateway
            .search(&collection, &query, &OutputField::ALL, self.search_limit, self.metric)
            .await;

        let outcome = SearchOutcome::partition(matches, self.similarity_threshold);
        debug!(
            collection = %collection,
            retrieved = outcome.data.len(),
            matched = outcome.matched.len(),
            threshold = self.similarity_threshold,
            "Searched document"
        );
        Ok(outcome)
    }

    /// Answer a question about a document.
    ///
    /// Never fails: any stage failure or an empty match set yields an empty
    /// string, and only non-empty answers are cached.
    pub async fn answer(&self, question: &str, document_id: &str) -> String {
        let question = question.trim();
        if question.is_empty() {
            return String::new();
        }

        if let Some(hit) = self.cache.get(document_id, question).await {
            debug!(document = document_id, "Answer served from cache");
            return hit;
        }

        match self.answer_uncached(question, document_id).await {
            Ok(answer) if !answer.trim().is_empty() => {
                self.cache.insert(document_id, question, answer.clone()).await;
                answer
            }
            Ok(_) => String::new(),
            Err(e) => {
                error!(document = document_id, kind = e.kind(), error = %e, "Failed to answer question");
                String::new()
            }
        }
    }

    async fn answer_uncached(&self, question: &str, document_id: &str) -> DocragResult<String> {
        let outcome = self.search(question, document_id).await?;
        if outcome.matched.is_empty() {
            info!(
                document = document_id,
                retrieved = outcome.data.len(),
                "No segment above the similarity threshold"
            );
            return Ok(String::new());
        }

        let contexts: Vec<String> = outcome.matched_texts().into_iter().map(str::to_string).collect();
        self.generation.answer(question, &contexts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_is_scoped_by_document() {
        let cache = ResponseCache::default();
        cache.insert("AAA", "what?", "first".to_string()).await;

        assert_eq!(cache.get("AAA", "what?").await.as_deref(), Some("first"));
        assert_eq!(cache.get("BBB", "what?").await, None);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        for i in 0..10 {
            cache.insert("doc", &format!("q{i}"), "a".to_string()).await;
        }
        cache.run_pending_tasks().await;
        assert!(cache.entry_count() <= 2);
    }
}
