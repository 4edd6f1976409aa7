//! Retrieval wiring and the `search` command.
//!
//! [`build_retriever`] assembles the two-stage retriever from config
//! (Qdrant store, embedding provider, reranker). `search` runs it directly
//! and prints the parents it returns, without any generation step.

use anyhow::Result;
use std::sync::Arc;

use medirag_core::models::Fragment;
use medirag_core::retrieve::Retriever;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::qdrant::QdrantStore;
use crate::rerank::create_reranker;

const PREVIEW_CHARS: usize = 300;

pub fn build_retriever(config: &Config) -> Result<Arc<Retriever>> {
    let store = Arc::new(QdrantStore::new(&config.vector_store)?);
    let embedder = create_provider(&config.embedding)?;
    let reranker = create_reranker(&config.reranker)?;
    Ok(Arc::new(
        Retriever::new(store, embedder, reranker, config.vector_store.collection.clone())
            .with_fetch_multiplier(config.retrieval.fetch_multiplier),
    ))
}

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let retriever = build_retriever(config)?;
    let k = k.unwrap_or(config.retrieval.k).max(1);
    let results = retriever.search(query, k).await?;
    print_results(&results);
    Ok(())
}

pub fn print_results(results: &[Fragment]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, fragment) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            fragment.relevance_score.unwrap_or(0.0),
            fragment.locator()
        );
        println!("    id: {}", fragment.id);
        println!("    length: {} chars", fragment.content.chars().count());
        println!("    excerpt: \"{}\"", preview(&fragment.content, PREVIEW_CHARS));
        println!();
    }
}

/// First `max` characters on one line, with an ellipsis if truncated.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}
