//! Qdrant REST client implementing [`VectorStore`].
//!
//! Talks to Qdrant's HTTP API (default port 6333) with plain JSON:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `collection_exists` | `GET /collections/{name}/exists` |
//! | `create_collection` | `PUT /collections/{name}` |
//! | `delete_collection` | `DELETE /collections/{name}` |
//! | `upsert` | `PUT /collections/{name}/points?wait=true` |
//! | `query` | `POST /collections/{name}/points/query` |
//! | `retrieve` | `POST /collections/{name}/points` |
//!
//! Failures to connect (connection refused, DNS failure, connect timeout)
//! map to [`StoreError::Unavailable`]. Read timeouts, HTTP error statuses
//! and malformed bodies map to [`StoreError::Other`].

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use medirag_core::store::{
    Distance, Payload, PayloadFilter, Point, ScoredPoint, StoreError, StoreResult, StoredPoint,
    VectorStore,
};

use crate::config::{read_env_credential, VectorStoreConfig};

const CONNECT_TIMEOUT_SECS: u64 = 5;

pub struct QdrantStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> anyhow::Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(read_env_credential(var, "the Qdrant API key")?),
            None => None,
        };
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(CONNECT_TIMEOUT_SECS)))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    /// Send the request and return the response body, treating any
    /// non-success status except those in `allowed` as an error.
    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
        allowed: &[u16],
    ) -> StoreResult<(u16, Value)> {
        let response = req.send().await.map_err(|e| classify(e, &self.base_url))?;
        let status = response.status();

        if !status.is_success() {
            if allowed.contains(&status.as_u16()) {
                return Ok((status.as_u16(), Value::Null));
            }
            let body_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Qdrant {} failed with {}: {}", what, status, body_text).into());
        }

        let body = response
            .json::<Value>()
            .await
            .with_context(|| format!("Qdrant {} returned an unreadable body", what))?;
        Ok((status.as_u16(), body))
    }
}

/// Map a transport error to the store error taxonomy. Only connect
/// failures, connect timeouts included, are `Unavailable`.
fn classify(err: reqwest::Error, base_url: &str) -> StoreError {
    if err.is_connect() {
        StoreError::Unavailable(format!("cannot reach Qdrant at {}: {}", base_url, err))
    } else {
        StoreError::Other(anyhow::Error::new(err).context("Qdrant request failed"))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        let req = self.request(reqwest::Method::GET, &format!("/collections/{}/exists", name));
        let (_, body) = self.send(req, "collection exists", &[]).await?;
        Ok(parse_exists(&body)?)
    }

    async fn create_collection(&self, name: &str, vector_size: usize, distance: Distance) -> StoreResult<()> {
        debug!(collection = name, vector_size, "creating Qdrant collection");
        let req = self
            .request(reqwest::Method::PUT, &format!("/collections/{}", name))
            .json(&json!({
                "vectors": { "size": vector_size, "distance": distance.as_str() }
            }));
        self.send(req, "create collection", &[]).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        let req = self.request(reqwest::Method::DELETE, &format!("/collections/{}", name));
        self.send(req, "delete collection", &[404]).await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> StoreResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = points
            .into_iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
            .collect();
        let req = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", collection),
            )
            .json(&json!({ "points": points }));
        self.send(req, "upsert", &[]).await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> StoreResult<Vec<ScoredPoint>> {
        let req = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/query", collection),
            )
            .json(&query_body(vector, filter, limit));
        let (_, body) = self.send(req, "query", &[]).await?;
        Ok(parse_query_response(&body)?)
    }

    async fn retrieve(&self, collection: &str, ids: &[String]) -> StoreResult<Vec<StoredPoint>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let req = self
            .request(reqwest::Method::POST, &format!("/collections/{}/points", collection))
            .json(&json!({ "ids": ids, "with_payload": true, "with_vector": false }));
        let (_, body) = self.send(req, "retrieve", &[]).await?;
        Ok(parse_retrieve_response(&body)?)
    }
}

fn query_body(vector: &[f32], filter: Option<&PayloadFilter>, limit: usize) -> Value {
    let mut body = json!({
        "query": vector,
        "limit": limit,
        "with_payload": true,
    });
    if let Some(f) = filter {
        let must: Vec<Value> = f
            .must
            .iter()
            .map(|m| json!({ "key": m.key, "match": { "value": m.value } }))
            .collect();
        body["filter"] = json!({ "must": must });
    }
    body
}

fn parse_exists(body: &Value) -> anyhow::Result<bool> {
    body.pointer("/result/exists")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| anyhow!("Invalid Qdrant response: missing result.exists"))
}

/// Qdrant ids are either unsigned integers or UUID strings.
fn point_id(value: Option<&Value>) -> anyhow::Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(anyhow!("Invalid Qdrant response: point without id")),
    }
}

fn payload_of(point: &Value) -> Payload {
    point
        .get("payload")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default()
}

fn parse_query_response(body: &Value) -> anyhow::Result<Vec<ScoredPoint>> {
    let points = body
        .pointer("/result/points")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Qdrant response: missing result.points"))?;

    points
        .iter()
        .map(|p| {
            Ok(ScoredPoint {
                id: point_id(p.get("id"))?,
                score: p.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
                payload: payload_of(p),
            })
        })
        .collect()
}

fn parse_retrieve_response(body: &Value) -> anyhow::Result<Vec<StoredPoint>> {
    let points = body
        .get("result")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Qdrant response: missing result array"))?;

    points
        .iter()
        .map(|p| {
            Ok(StoredPoint {
                id: point_id(p.get("id"))?,
                payload: payload_of(p),
            })
        })
        .collect()
}
