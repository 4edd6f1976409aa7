//! Reranker trait and a lexical fallback implementation.
//!
//! A reranker scores `(query, document)` pairs more precisely than the
//! dense search that produced the candidates. The retriever hands it every
//! distinct parent fragment and keeps the reranker's ordering.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;

use crate::store::Payload;

/// A document submitted for reranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankCandidate {
    pub id: String,
    pub text: String,
    pub meta: Payload,
}

/// A reranked document. Higher `score` means more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankResult {
    pub id: String,
    pub text: String,
    pub meta: Payload,
    pub score: f32,
}

/// Pairwise query/document relevance scorer.
///
/// Implementations must return at most `top_n` results ordered by
/// descending score, each carrying the `id` of one of the candidates.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>>;
}

/// Term-overlap reranker that runs in process.
///
/// It has no notion of meaning, only shared words, so it is meant for
/// offline runs and tests; production setups use a cross-encoder.
///
/// Score = fraction of distinct query terms present in the document plus
/// the share of document tokens that are query terms. Ties keep the input
/// order.
#[derive(Debug, Clone, Default)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub fn new() -> Self {
        Self
    }

    pub fn score(query: &str, text: &str) -> f32 {
        let query_terms: HashSet<String> = tokenize(query).collect();
        if query_terms.is_empty() {
            return 0.0;
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total = 0usize;
        for tok in tokenize(text) {
            *counts.entry(tok).or_insert(0) += 1;
            total += 1;
        }
        if total == 0 {
            return 0.0;
        }

        let matched = query_terms.iter().filter(|t| counts.contains_key(*t)).count();
        let occurrences: usize = query_terms.iter().filter_map(|t| counts.get(t)).sum();

        matched as f32 / query_terms.len() as f32 + occurrences as f32 / total as f32
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        top_n: usize,
    ) -> Result<Vec<RerankResult>> {
        let mut scored: Vec<RerankResult> = candidates
            .into_iter()
            .map(|c| RerankResult {
                score: Self::score(query, &c.text),
                id: c.id,
                text: c.text,
                meta: c.meta,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_n);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, text: &str) -> RerankCandidate {
        RerankCandidate {
            id: id.to_string(),
            text: text.to_string(),
            meta: Payload::new(),
        }
    }

    #[test]
    fn test_score_prefers_coverage() {
        let q = "insulin resistance treatment";
        let full = LexicalReranker::score(q, "Treatment of insulin resistance with metformin.");
        let partial = LexicalReranker::score(q, "Insulin is a hormone.");
        let none = LexicalReranker::score(q, "Completely unrelated text about astronomy.");
        assert!(full > partial);
        assert!(partial > none);
        assert_eq!(none, 0.0);
    }

    #[test]
    fn test_score_empty_inputs() {
        assert_eq!(LexicalReranker::score("", "anything"), 0.0);
        assert_eq!(LexicalReranker::score("query", ""), 0.0);
    }

    #[tokio::test]
    async fn test_rerank_orders_and_truncates() {
        let out = LexicalReranker::new()
            .rerank(
                "statin dosage",
                vec![
                    candidate("a", "Nothing relevant here."),
                    candidate("b", "Statin dosage depends on LDL targets; statin dosage varies."),
                    candidate("c", "Statin therapy overview."),
                ],
                2,
            )
            .await
            .unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(out[0].score >= out[1].score);
    }

    #[tokio::test]
    async fn test_rerank_stable_on_ties() {
        let out = LexicalReranker::new()
            .rerank(
                "zzz",
                vec![candidate("first", "aa bb"), candidate("second", "cc dd")],
                5,
            )
            .await
            .unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
