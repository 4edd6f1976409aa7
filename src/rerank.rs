//! Reranker implementations.
//!
//! - `local` (default): [`LocalReranker`], a cross-encoder run in process
//!   via fastembed (`bge-reranker-base`). Requires the
//!   `local-embeddings-fastembed` feature.
//! - `http`: [`HttpReranker`], a cross-encoder served behind the common
//!   `/rerank` API (Cohere, Jina, Hugging Face TEI, infinity):
//!
//! ```text
//! POST {url}/rerank
//! { "model": "...", "query": "...", "documents": ["..."], "top_n": 4 }
//! → { "results": [{ "index": 2, "relevance_score": 0.97 }, ...] }
//! ```
//!
//! - `lexical`: [`LexicalReranker`] from the core crate. Term overlap only;
//!   meant for offline runs and tests.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use medirag_core::rerank::{LexicalReranker, RerankCandidate, RerankResult, Reranker};

use crate::config::{read_env_credential, RerankerConfig};

#[cfg_attr(not(feature = "local-embeddings-fastembed"), allow(dead_code))]
const DEFAULT_LOCAL_RERANKER: &str = "bge-reranker-base";
const DEFAULT_HTTP_RERANKER: &str = "ms-marco-MiniLM-L-12-v2";

// ============ Local Reranker (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_reranker(name: &str) -> Result<fastembed::RerankerModel> {
    match name {
        "bge-reranker-base" => Ok(fastembed::RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" => Ok(fastembed::RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" => Ok(fastembed::RerankerModel::JINARerankerV1TurboEn),
        other => bail!(
            "Unknown local reranker model: '{}'. Supported models: \
             bge-reranker-base, bge-reranker-v2-m3, jina-reranker-v1-turbo-en",
            other
        ),
    }
}

/// In-process cross-encoder backed by fastembed's `TextRerank`.
///
/// Each `(query, document)` pair is scored jointly. The ONNX model is
/// downloaded on first use and kept for the lifetime of the reranker.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalReranker {
    model_name: String,
    model: Arc<std::sync::Mutex<Option<fastembed::TextRerank>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_RERANKER.to_string());
        config_to_fastembed_reranker(&model_name)?;
        Ok(Self {
            model_name,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Reranker for LocalReranker {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let fastembed_model = config_to_fastembed_reranker(&self.model_name)?;
        let query = query.to_string();
        let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let slot = Arc::clone(&self.model);

        let scores = tokio::task::spawn_blocking(move || -> Result<Vec<(usize, f32)>> {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("Local reranker lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextRerank::try_new(
                    fastembed::RerankInitOptions::new(fastembed_model)
                        .with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local reranker: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("Local reranker not initialized"))?;

            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            let results = model
                .rerank(query.as_str(), &docs, false, None)
                .map_err(|e| anyhow!("Local reranking failed: {}", e))?;
            Ok(results.into_iter().map(|r| (r.index, r.score)).collect())
        })
        .await??;

        Ok(apply_scores(candidates, scores, top_n))
    }
}

// ============ HTTP Reranker ============

pub struct HttpReranker {
    url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow!("reranker.url required for http reranker"))?;
        let api_key = match &config.api_key_env {
            Some(var) => Some(read_env_credential(var, "the reranker")?),
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_HTTP_RERANKER.to_string()),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn name(&self) -> &str {
        &self.model
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let documents: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        });

        let mut req = self.client.post(format!("{}/rerank", self.url)).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.context("Rerank request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Rerank API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let scores = parse_rerank_response(&json, candidates.len())?;
        Ok(apply_scores(candidates, scores, top_n))
    }
}

/// Extract `(index, score)` pairs, rejecting out-of-range indices.
fn parse_rerank_response(json: &serde_json::Value, n: usize) -> Result<Vec<(usize, f32)>> {
    let results = json
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow!("Invalid rerank response: missing results array"))?;

    results
        .iter()
        .map(|r| {
            let index = r
                .get("index")
                .and_then(|i| i.as_u64())
                .ok_or_else(|| anyhow!("Invalid rerank response: missing index"))?
                as usize;
            if index >= n {
                bail!("Invalid rerank response: index {} out of range", index);
            }
            let score = r
                .get("relevance_score")
                .and_then(|s| s.as_f64())
                .ok_or_else(|| anyhow!("Invalid rerank response: missing relevance_score"))?;
            Ok((index, score as f32))
        })
        .collect()
}

/// Pair scores with their candidates, sort descending and keep `top_n`.
/// A candidate scored more than once keeps its first score.
fn apply_scores(
    candidates: Vec<RerankCandidate>,
    scores: Vec<(usize, f32)>,
    top_n: usize,
) -> Vec<RerankResult> {
    let mut slots: Vec<Option<RerankCandidate>> = candidates.into_iter().map(Some).collect();
    let mut out: Vec<RerankResult> = Vec::with_capacity(scores.len());
    for (index, score) in scores {
        if let Some(c) = slots.get_mut(index).and_then(Option::take) {
            out.push(RerankResult {
                id: c.id,
                text: c.text,
                meta: c.meta,
                score,
            });
        }
    }
    out.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out.truncate(top_n);
    out
}

/// Create the [`Reranker`] named by `config.provider`.
///
/// | Config Value | Reranker |
/// |-------------|----------|
/// | `"local"` | [`LocalReranker`] (requires `local-embeddings-fastembed`) |
/// | `"http"` | [`HttpReranker`] |
/// | `"lexical"` | [`LexicalReranker`] |
pub fn create_reranker(config: &RerankerConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalReranker::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local reranker requires --features local-embeddings-fastembed"),
        "lexical" => Ok(Arc::new(LexicalReranker::new())),
        "http" => Ok(Arc::new(HttpReranker::new(config)?)),
        other => bail!("Unknown reranker provider: {}", other),
    }
}
