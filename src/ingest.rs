//! Ingestion pipeline.
//!
//! `load → clean → filter → split → recreate collection → upload`.
//!
//! Every run rebuilds the collection from scratch, so re-ingesting the same
//! documents never leaves stale fragments behind.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use medirag_core::chunk::{ChunkSummary, ParentChildChunker};
use medirag_core::clean::{Cleaner, ReferenceCleaner};
use medirag_core::embedding::EmbeddingProvider;
use medirag_core::index::{IndexingGateway, UploadReport};
use medirag_core::models::{Fragment, SourceDocument};
use medirag_core::store::VectorStore;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::loader::{default_loaders, load_path};
use crate::qdrant::QdrantStore;

/// Clean every page and drop those left with `min_chars` characters or fewer.
pub fn prepare_pages(
    pages: Vec<SourceDocument>,
    cleaner: &dyn Cleaner,
    min_chars: usize,
) -> Vec<SourceDocument> {
    let total = pages.len();
    let kept: Vec<SourceDocument> = pages
        .into_iter()
        .filter_map(|page| {
            let text = cleaner.clean(&page.content);
            if text.chars().count() <= min_chars {
                return None;
            }
            Some(SourceDocument::new(text, page.metadata.source, page.metadata.page).cleaned())
        })
        .collect();
    debug!(total, kept = kept.len(), "cleaned pages");
    kept
}

/// Load, clean and split everything under `paths`.
pub fn build_fragments(config: &Config, paths: &[PathBuf]) -> Result<(usize, Vec<Fragment>)> {
    let loaders = default_loaders();
    let mut pages = Vec::new();
    for path in paths {
        pages.extend(load_path(path, &loaders)?);
    }

    let pages = prepare_pages(pages, &ReferenceCleaner::new(), config.cleaning.min_page_chars);
    if pages.is_empty() {
        bail!("No usable pages found in the given paths");
    }

    let chunker = ParentChildChunker::new(config.chunking.params())?;
    let fragments = chunker.split_documents(&pages);
    Ok((pages.len(), fragments))
}

/// Recreate the collection and upload `fragments` into it.
pub async fn index_fragments(
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: &Config,
    fragments: &[Fragment],
) -> Result<UploadReport> {
    let gateway = IndexingGateway::new(store, embedder, config.vector_store.collection.clone())
        .with_batch_size(config.embedding.batch_size);
    gateway.force_recreate().await?;
    gateway.upload(fragments).await
}

pub async fn run_ingest(config: &Config, paths: &[PathBuf], dry_run: bool) -> Result<()> {
    let started = Instant::now();
    let (pages, fragments) = build_fragments(config, paths)?;
    let summary = ChunkSummary::of(&fragments);
    info!(pages, parents = summary.parents, children = summary.children, "split complete");

    if dry_run {
        println!("ingest (dry-run)");
        print_counts(pages, &summary);
        return Ok(());
    }

    let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::new(&config.vector_store)?);
    let embedder = create_provider(&config.embedding)?;
    let report = index_fragments(store, embedder, config, &fragments).await?;

    println!("ingest {}", config.vector_store.collection);
    print_counts(pages, &summary);
    println!("  batches uploaded: {}", report.batches);
    println!("  fragments uploaded: {}", report.fragments);
    println!("  elapsed: {:.1}s", started.elapsed().as_secs_f64());
    println!("ok");
    Ok(())
}

fn print_counts(pages: usize, summary: &ChunkSummary) {
    println!("  pages: {}", pages);
    println!("  parents: {}", summary.parents);
    println!("  children: {}", summary.children);
    println!("  children per parent: {:.1}", summary.children_per_parent());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_pages_cleans_and_filters() {
        let pages = vec![
            SourceDocument::new(
                "Statins   reduce LDL cholesterol [12] significantly in most adult patients • see https://example.org/x",
                "lipids.pdf",
                1,
            ),
            SourceDocument::new("Page 2 [3]", "lipids.pdf", 2),
        ];
        let kept = prepare_pages(pages, &ReferenceCleaner::new(), 50);

        assert_eq!(kept.len(), 1);
        let page = &kept[0];
        assert_eq!(page.metadata.page, 1);
        assert!(page.metadata.cleaned);
        assert!(!page.content.contains("[12]"));
        assert!(!page.content.contains("http"));
        assert!(!page.content.contains('•'));
        assert!(!page.content.contains("  "));
        assert_eq!(page.metadata.char_count, page.content.chars().count());
    }

    #[test]
    fn test_build_fragments_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let body = "Hypertension is persistently elevated arterial blood pressure. ".repeat(20);
        std::fs::write(dir.path().join("htn.txt"), &body).unwrap();
        std::fs::write(dir.path().join("short.txt"), "too short").unwrap();

        let (pages, fragments) = build_fragments(&Config::minimal(), &[dir.path().to_path_buf()]).unwrap();
        assert_eq!(pages, 1);
        let summary = ChunkSummary::of(&fragments);
        assert!(summary.parents >= 1);
        assert!(summary.children >= summary.parents);
    }

    #[test]
    fn test_build_fragments_nothing_usable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("short.txt"), "tiny").unwrap();
        assert!(build_fragments(&Config::minimal(), &[dir.path().to_path_buf()]).is_err());
    }
}
