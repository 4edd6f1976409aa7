//! In-memory [`VectorStore`] implementation for testing and small corpora.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Queries are brute-force cosine similarity over every point in the
//! collection, so the configured [`Distance`] is recorded but not honoured.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

use super::{
    Distance, PayloadFilter, Point, ScoredPoint, StoreError, StoreResult, StoredPoint, VectorStore,
};
use crate::embedding::cosine_similarity;

struct Collection {
    vector_size: usize,
    _distance: Distance,
    points: Vec<Point>,
    index: HashMap<String, usize>,
}

/// In-memory store, one `Vec` of points per collection.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of points in a collection (0 if it does not exist).
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(name: &str) -> StoreError {
    StoreError::Other(anyhow!("collection '{}' does not exist", name))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn collection_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.collections.read().unwrap().contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> StoreResult<()> {
        let mut collections = self.collections.write().unwrap();
        if collections.contains_key(name) {
            return Err(StoreError::Other(anyhow!(
                "collection '{}' already exists",
                name
            )));
        }
        collections.insert(
            name.to_string(),
            Collection {
                vector_size,
                _distance: distance,
                points: Vec::new(),
                index: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> StoreResult<()> {
        self.collections.write().unwrap().remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> StoreResult<()> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != coll.vector_size) {
            return Err(StoreError::Other(anyhow!(
                "point {} has {} dims, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                collection,
                coll.vector_size
            )));
        }

        for point in points {
            match coll.index.get(&point.id) {
                Some(&pos) => coll.points[pos] = point,
                None => {
                    coll.index.insert(point.id.clone(), coll.points.len());
                    coll.points.push(point);
                }
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> StoreResult<Vec<ScoredPoint>> {
        let collections = self.collections.read().unwrap();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut hits: Vec<ScoredPoint> = coll
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn retrieve(&self, collection: &str, ids: &[String]) -> StoreResult<Vec<StoredPoint>> {
        let collections = self.collections.read().unwrap();
        let coll = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(ids
            .iter()
            .filter_map(|id| coll.index.get(id))
            .map(|&pos| {
                let p = &coll.points[pos];
                StoredPoint {
                    id: p.id.clone(),
                    payload: p.payload.clone(),
                }
            })
            .collect())
    }
}
