//! Vector store abstraction for MediRAG.
//!
//! The [`VectorStore`] trait is the contract the indexing gateway and the
//! retriever need from a vector database: collection lifecycle, point
//! upsert, filtered nearest-neighbour query and lookup by id. Backends
//! include the in-memory store in [`memory`] and the Qdrant REST client in
//! the app crate.
//!
//! Connectivity failures are reported as [`StoreError::Unavailable`] so
//! callers can branch on them without inspecting error messages.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arbitrary key/value payload attached to a point.
pub type Payload = serde_json::Map<String, Value>;

/// Similarity metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
}

impl Distance {
    /// Name used on the wire by Qdrant-compatible stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
        }
    }
}

/// A vector plus payload, as written by `upsert`.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A query hit. Higher `score` means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// A point fetched by id (payload only).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: String,
    pub payload: Payload,
}

/// Exact-match condition on a payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub key: String,
    pub value: Value,
}

/// Conjunction of field matches; all must hold for a point to qualify.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadFilter {
    pub must: Vec<FieldMatch>,
}

impl PayloadFilter {
    pub fn must_match(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            must: vec![FieldMatch {
                key: key.into(),
                value: value.into(),
            }],
        }
    }

    pub fn and_match(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(FieldMatch {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        self.must
            .iter()
            .all(|m| payload.get(&m.key) == Some(&m.value))
    }
}

/// Errors returned by a [`VectorStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (connection refused, DNS failure,
    /// connect timeout).
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    /// Any other failure: bad request, missing collection, malformed
    /// response.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Abstract vector database backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection_exists`](VectorStore::collection_exists) | Check for a collection |
/// | [`create_collection`](VectorStore::create_collection) | Create with size + metric |
/// | [`delete_collection`](VectorStore::delete_collection) | Drop a collection and its points |
/// | [`upsert`](VectorStore::upsert) | Insert or replace points by id |
/// | [`query`](VectorStore::query) | Filtered nearest-neighbour search |
/// | [`retrieve`](VectorStore::retrieve) | Fetch payloads by id |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, name: &str) -> StoreResult<bool>;

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> StoreResult<()>;

    /// Deleting a collection that does not exist is not an error.
    async fn delete_collection(&self, name: &str) -> StoreResult<()>;

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> StoreResult<()>;

    /// Return at most `limit` hits ordered by descending score.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> StoreResult<Vec<ScoredPoint>>;

    /// Ids that do not exist are silently skipped.
    async fn retrieve(&self, collection: &str, ids: &[String]) -> StoreResult<Vec<StoredPoint>>;
}
