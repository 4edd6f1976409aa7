//! Two-stage parent-document retriever.
//!
//! # Algorithm
//!
//! 1. **Recall.** Embed the query and run a dense search restricted to
//!    child fragments, fetching `fetch_multiplier × k` hits (4k by default).
//! 2. **Parent resolution.** Collect the distinct `parent_id`s of those
//!    hits, in first-seen order, and fetch the parent fragments by id. A
//!    parent matched by several children is fetched once.
//! 3. **Precision.** Rerank every candidate parent against the query and
//!    keep the reranker's top `k`, with its score attached as
//!    `relevance_score`. Dense-search scores are discarded.
//!
//! No hits, or no resolvable parents, yields an empty result rather than an
//! error. Any failure aborts the search; partial results are never returned.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::models::{Fragment, FragmentKind, RetrievalCandidate};
use crate::record::{fragment_from_payload, KIND_FIELD};
use crate::rerank::{RerankCandidate, Reranker};
use crate::store::{PayloadFilter, StoreError, VectorStore};

pub const DEFAULT_FETCH_MULTIPLIER: usize = 4;

/// Why a search failed.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The vector store could not be reached.
    #[error("vector store unavailable: {0}")]
    VectorStoreUnavailable(String),
    #[error("vector store error: {0:#}")]
    Store(anyhow::Error),
    #[error("query embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("reranking failed: {0:#}")]
    Rerank(anyhow::Error),
}

impl From<StoreError> for RetrievalError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => RetrievalError::VectorStoreUnavailable(msg),
            StoreError::Other(err) => RetrievalError::Store(err),
        }
    }
}

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn Reranker>,
    collection: String,
    fetch_multiplier: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn Reranker>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            reranker,
            collection: collection.into(),
            fetch_multiplier: DEFAULT_FETCH_MULTIPLIER,
        }
    }

    pub fn with_fetch_multiplier(mut self, multiplier: usize) -> Self {
        self.fetch_multiplier = multiplier.max(1);
        self
    }

    /// Return up to `k` parent fragments, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Fragment>, RetrievalError> {
        Ok(self
            .search_candidates(query, k)
            .await?
            .into_iter()
            .map(RetrievalCandidate::into_fragment)
            .collect())
    }

    /// Like [`search`](Self::search) but keeps fragment and score apart.
    pub async fn search_candidates(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievalCandidate>, RetrievalError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let fetch_k = k.saturating_mul(self.fetch_multiplier);
        debug!(query, fetch_k, "dense search over children");

        let query_vec = self
            .embedder
            .embed_one(query)
            .await
            .map_err(RetrievalError::Embedding)?;

        let filter = PayloadFilter::must_match(KIND_FIELD, FragmentKind::Child.as_str());
        let hits = self
            .store
            .query(&self.collection, &query_vec, Some(&filter), fetch_k)
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut parent_ids: Vec<String> = Vec::new();
        for hit in &hits {
            if let Some(pid) = hit.payload.get("parent_id").and_then(|v| v.as_str()) {
                if seen.insert(pid.to_string()) {
                    parent_ids.push(pid.to_string());
                }
            }
        }
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let points = self.store.retrieve(&self.collection, &parent_ids).await?;
        let mut parents: HashMap<String, Fragment> = HashMap::new();
        let mut rerank_input: Vec<RerankCandidate> = Vec::new();
        for point in points {
            let fragment = fragment_from_payload(&point.payload).map_err(RetrievalError::Store)?;
            if !fragment.is_parent() {
                warn!(id = %point.id, "parent lookup returned a non-parent record; skipping");
                continue;
            }
            rerank_input.push(RerankCandidate {
                id: fragment.id.clone(),
                text: fragment.content.clone(),
                meta: point.payload,
            });
            parents.insert(fragment.id.clone(), fragment);
        }
        if rerank_input.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            children = hits.len(),
            parents = rerank_input.len(),
            reranker = self.reranker.name(),
            "reranking candidates"
        );

        let ranked = self
            .reranker
            .rerank(query, rerank_input, k)
            .await
            .map_err(RetrievalError::Rerank)?;

        let mut results = Vec::with_capacity(ranked.len().min(k));
        for r in ranked.into_iter().take(k) {
            let fragment = parents.remove(&r.id).ok_or_else(|| {
                RetrievalError::Rerank(anyhow::anyhow!(
                    "reranker returned unknown or duplicate candidate id {}",
                    r.id
                ))
            })?;
            results.push(RetrievalCandidate {
                fragment,
                score: r.score,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceMetadata;
    use crate::record::fragment_to_payload;
    use crate::rerank::{LexicalReranker, RerankResult};
    use crate::store::memory::InMemoryVectorStore;
    use crate::store::{Distance, Point, ScoredPoint, StoreResult, StoredPoint};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Embeds text by counting a handful of keywords.
    struct KeywordEmbedder;

    const KEYWORDS: [&str; 4] = ["kidney", "heart", "lung", "liver"];

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keywords"
        }
        fn dims(&self) -> usize {
            KEYWORDS.len() + 1
        }
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    let mut v: Vec<f32> = KEYWORDS
                        .iter()
                        .map(|k| lower.matches(k).count() as f32)
                        .collect();
                    v.push(0.1);
                    v
                })
                .collect())
        }
    }

    /// Records the number of candidates it was given.
    struct RecordingReranker {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Reranker for RecordingReranker {
        fn name(&self) -> &str {
            "recording"
        }
        async fn rerank(
            &self,
            query: &str,
            candidates: Vec<RerankCandidate>,
            top_n: usize,
        ) -> Result<Vec<RerankResult>> {
            self.seen.lock().unwrap().push(candidates.len());
            LexicalReranker::new().rerank(query, candidates, top_n).await
        }
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn collection_exists(&self, _: &str) -> StoreResult<bool> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn create_collection(&self, _: &str, _: usize, _: Distance) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete_collection(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn upsert(&self, _: &str, _: Vec<Point>) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn query(
            &self,
            _: &str,
            _: &[f32],
            _: Option<&PayloadFilter>,
            _: usize,
        ) -> StoreResult<Vec<ScoredPoint>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn retrieve(&self, _: &str, _: &[String]) -> StoreResult<Vec<StoredPoint>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn fragment(id: &str, kind: FragmentKind, parent: Option<&str>, text: &str) -> Fragment {
        Fragment {
            id: id.to_string(),
            kind,
            content: text.to_string(),
            parent_id: parent.map(str::to_string),
            metadata: SourceMetadata {
                source: "organs.pdf".into(),
                page: 1,
                cleaned: true,
                char_count: text.len(),
            },
            relevance_score: None,
        }
    }

    async fn seeded_store() -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .create_collection("kb", KeywordEmbedder.dims(), Distance::Cosine)
            .await
            .unwrap();
        let frags = vec![
            fragment("p-kidney", FragmentKind::Parent, None, "Kidney function and kidney filtration rates."),
            fragment("c-k1", FragmentKind::Child, Some("p-kidney"), "Kidney function"),
            fragment("c-k2", FragmentKind::Child, Some("p-kidney"), "kidney filtration rates"),
            fragment("p-heart", FragmentKind::Parent, None, "Heart failure and heart rhythm."),
            fragment("c-h1", FragmentKind::Child, Some("p-heart"), "Heart failure"),
            fragment("p-lung", FragmentKind::Parent, None, "Lung capacity in athletes."),
            fragment("c-l1", FragmentKind::Child, Some("p-lung"), "Lung capacity"),
        ];
        let texts: Vec<String> = frags.iter().map(|f| f.content.clone()).collect();
        let vectors = KeywordEmbedder.embed_many(&texts).await.unwrap();
        let points = frags
            .iter()
            .zip(vectors)
            .map(|(f, v)| Point {
                id: f.id.clone(),
                vector: v,
                payload: fragment_to_payload(f).unwrap(),
            })
            .collect();
        store.upsert("kb", points).await.unwrap();
        store
    }

    fn retriever(store: Arc<dyn VectorStore>, reranker: Arc<dyn Reranker>) -> Retriever {
        Retriever::new(store, Arc::new(KeywordEmbedder), reranker, "kb")
    }

    #[tokio::test]
    async fn test_returns_parents_only_bounded_by_k() {
        let store = seeded_store().await;
        let r = retriever(store, Arc::new(LexicalReranker::new()));
        let results = r.search("kidney filtration", 2).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].id, "p-kidney");
        for f in &results {
            assert!(f.is_parent());
            assert!(f.relevance_score.is_some());
        }
        for pair in results.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[tokio::test]
    async fn test_parents_deduplicated_before_rerank() {
        let store = seeded_store().await;
        let reranker = Arc::new(RecordingReranker {
            seen: Mutex::new(Vec::new()),
        });
        let r = retriever(store, reranker.clone());
        // fetch_k = 4 * 3 = 12 covers every child: 4 children, 3 distinct parents.
        let results = r.search("kidney", 3).await.unwrap();
        assert_eq!(*reranker.seen.lock().unwrap(), vec![3]);
        let mut ids: Vec<&str> = results.iter().map(|f| f.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), results.len());
    }

    #[tokio::test]
    async fn test_empty_collection_returns_empty() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("kb", 5, Distance::Cosine).await.unwrap();
        let r = retriever(store, Arc::new(LexicalReranker::new()));
        assert!(r.search("kidney", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_huge_k_saturates_fetch_size() {
        let store = seeded_store().await;
        let r = retriever(store, Arc::new(LexicalReranker::new()));
        let results = r.search("kidney heart lung", usize::MAX).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|f| f.is_parent()));
    }

    #[tokio::test]
    async fn test_zero_k_and_blank_query() {
        let store = seeded_store().await;
        let r = retriever(store, Arc::new(LexicalReranker::new()));
        assert!(r.search("kidney", 0).await.unwrap().is_empty());
        assert!(r.search("   ", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_classified() {
        let r = retriever(Arc::new(DownStore), Arc::new(LexicalReranker::new()));
        let err = r.search("kidney", 4).await.unwrap_err();
        assert!(matches!(err, RetrievalError::VectorStoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_other_store_errors_propagate() {
        let store = Arc::new(InMemoryVectorStore::new());
        let r = retriever(store, Arc::new(LexicalReranker::new()));
        let err = r.search("kidney", 4).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Store(_)));
    }

    #[tokio::test]
    async fn test_missing_parents_yield_empty() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("kb", 5, Distance::Cosine).await.unwrap();
        let orphan = fragment("c-x", FragmentKind::Child, Some("gone"), "kidney");
        store
            .upsert(
                "kb",
                vec![Point {
                    id: orphan.id.clone(),
                    vector: vec![1.0, 0.0, 0.0, 0.0, 0.1],
                    payload: fragment_to_payload(&orphan).unwrap(),
                }],
            )
            .await
            .unwrap();
        let r = retriever(store, Arc::new(LexicalReranker::new()));
        assert!(r.search("kidney", 4).await.unwrap().is_empty());
    }
}
