//! Indexing gateway: embeds fragments and writes them to the vector store.
//!
//! Fragments are uploaded in fixed-size batches, in the order the chunker
//! produced them, so a parent is always persisted no later than its
//! children. A failing batch aborts the whole upload; there is no retry
//! and no attempt to reconcile a partially written collection. Callers
//! that want a clean index call [`IndexingGateway::force_recreate`] first.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::models::Fragment;
use crate::record::fragment_to_payload;
use crate::store::{Distance, Point, VectorStore};

pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Outcome of a successful [`IndexingGateway::upload`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub fragments: usize,
    pub batches: usize,
}

pub struct IndexingGateway {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    batch_size: usize,
}

impl IndexingGateway {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the batch size (values below 1 are treated as 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Create the collection (cosine metric, embedder dimensionality) if it
    /// is missing. Returns `true` when it had to be created.
    pub async fn ensure_collection(&self) -> Result<bool> {
        if self.store.collection_exists(&self.collection).await? {
            return Ok(false);
        }
        info!(collection = %self.collection, dims = self.embedder.dims(), "creating collection");
        self.store
            .create_collection(&self.collection, self.embedder.dims(), Distance::Cosine)
            .await?;
        Ok(true)
    }

    /// Drop the collection and create it again, empty.
    pub async fn force_recreate(&self) -> Result<()> {
        info!(collection = %self.collection, "recreating collection");
        self.store.delete_collection(&self.collection).await?;
        self.ensure_collection().await?;
        Ok(())
    }

    /// Embed and upsert `fragments` batch by batch.
    ///
    /// # Errors
    ///
    /// Fails before writing anything if a child references a parent that
    /// does not precede it in `fragments`. Fails mid-way, leaving earlier
    /// batches written, if embedding or upsert of any batch fails.
    pub async fn upload(&self, fragments: &[Fragment]) -> Result<UploadReport> {
        check_parent_order(fragments)?;

        let dims = self.embedder.dims();
        let mut report = UploadReport::default();

        for (batch_no, batch) in fragments.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|f| f.content.clone()).collect();
            let vectors = self
                .embedder
                .embed_many(&texts)
                .await
                .with_context(|| format!("embedding batch {} failed", batch_no + 1))?;

            if vectors.len() != batch.len() {
                bail!(
                    "embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                );
            }

            let mut points = Vec::with_capacity(batch.len());
            for (fragment, vector) in batch.iter().zip(vectors) {
                if vector.len() != dims {
                    bail!(
                        "embedding for fragment {} has {} dims, expected {}",
                        fragment.id,
                        vector.len(),
                        dims
                    );
                }
                points.push(Point {
                    id: fragment.id.clone(),
                    vector,
                    payload: fragment_to_payload(fragment)?,
                });
            }

            self.store
                .upsert(&self.collection, points)
                .await
                .with_context(|| format!("upsert of batch {} failed", batch_no + 1))?;

            report.batches += 1;
            report.fragments += batch.len();
            debug!(batch = batch_no + 1, size = batch.len(), "uploaded batch");
        }

        info!(
            collection = %self.collection,
            fragments = report.fragments,
            batches = report.batches,
            "upload complete"
        );
        Ok(report)
    }
}

/// Every child must name a parent that appears earlier in the sequence.
fn check_parent_order(fragments: &[Fragment]) -> Result<()> {
    let mut parents: HashSet<&str> = HashSet::new();
    for f in fragments {
        if f.is_parent() {
            parents.insert(&f.id);
            continue;
        }
        match f.parent_id.as_deref() {
            Some(pid) if parents.contains(pid) => {}
            Some(pid) => bail!("child {} references parent {} before it is uploaded", f.id, pid),
            None => bail!("child {} has no parent_id", f.id),
        }
    }
    Ok(())
}
