//! In-process [`VectorStore`] with cosine search, for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::store::{DocPoint, SearchHit, VectorError, VectorResult, VectorStore};

struct Collection {
    dimension: usize,
    indexed: BTreeSet<String>,
    points: BTreeMap<String, DocPoint>,
}

#[derive(Default)]
pub struct MemoryVectorStore {
    collections: Mutex<HashMap<String, Collection>>,
    vanish_on_upsert: AtomicUsize,
    upserts: AtomicUsize,
    failing_entities: Mutex<HashSet<String>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` upserts find their collection deleted underneath them.
    pub fn vanish_on_next_upserts(&self, n: usize) {
        self.vanish_on_upsert.store(n, Ordering::SeqCst);
    }

    /// Upserts carrying a point for `entity` fail with a backend error.
    pub fn fail_upserts_for(&self, entity: &str) {
        self.failing_entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity.to_string());
    }

    /// Upsert calls made so far, failed ones included.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn points(&self, collection: &str) -> Vec<DocPoint> {
        self.lock()
            .get(collection)
            .map(|c| c.points.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Collection>> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_vanish(&self) -> bool {
        self.vanish_on_upsert
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn collection_exists(&self, collection: &str) -> VectorResult<bool> {
        Ok(self.lock().contains_key(collection))
    }

    async fn indexed_fields(&self, collection: &str) -> VectorResult<Vec<String>> {
        self.lock()
            .get(collection)
            .map(|c| c.indexed.iter().cloned().collect())
            .ok_or_else(|| VectorError::NotFound(collection.to_string()))
    }

    async fn create_collection(&self, collection: &str, dimension: usize) -> VectorResult<()> {
        self.lock().entry(collection.to_string()).or_insert_with(|| Collection {
            dimension,
            indexed: BTreeSet::new(),
            points: BTreeMap::new(),
        });
        Ok(())
    }

    async fn create_payload_index(&self, collection: &str, field: &str) -> VectorResult<()> {
        let mut collections = self.lock();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| VectorError::NotFound(collection.to_string()))?;
        c.indexed.insert(field.to_string());
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<DocPoint>) -> VectorResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        {
            let failing = self.failing_entities.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(p) = points.iter().find(|p| failing.contains(&p.payload.entity_name)) {
                return Err(VectorError::Backend(anyhow::anyhow!(
                    "service unavailable while writing {}",
                    p.payload.entity_name
                )));
            }
        }
        let mut collections = self.lock();
        if self.take_vanish() {
            collections.remove(collection);
        }
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| VectorError::NotFound(collection.to_string()))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != c.dimension) {
            return Err(VectorError::Backend(anyhow::anyhow!(
                "wrong vector dimension for point {}: expected {}, got {}",
                bad.id,
                c.dimension,
                bad.vector.len()
            )));
        }
        for point in points {
            c.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        connection_id: &str,
        limit: u64,
    ) -> VectorResult<Vec<SearchHit>> {
        let collections = self.lock();
        let c = collections
            .get(collection)
            .ok_or_else(|| VectorError::NotFound(collection.to_string()))?;

        let mut hits: Vec<SearchHit> = c
            .points
            .values()
            .filter(|p| p.payload.connection_id == connection_id)
            .map(|p| SearchHit {
                id: p.id.clone(),
                score: cosine(&vector, &p.vector),
                connection_id: p.payload.connection_id.clone(),
                entity_name: p.payload.entity_name.clone(),
                content: p.payload.content.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.entity_name.cmp(&b.entity_name)));
        hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(hits)
    }

    async fn delete_collection(&self, collection: &str) -> VectorResult<bool> {
        Ok(self.lock().remove(collection).is_some())
    }

    async fn count(&self, collection: &str, connection_id: Option<&str>) -> VectorResult<u64> {
        let collections = self.lock();
        let c = collections
            .get(collection)
            .ok_or_else(|| VectorError::NotFound(collection.to_string()))?;
        let n = c
            .points
            .values()
            .filter(|p| connection_id.is_none_or(|conn| p.payload.connection_id == conn))
            .count();
        Ok(n as u64)
    }

    async fn dimension(&self, collection: &str) -> VectorResult<Option<usize>> {
        self.lock()
            .get(collection)
            .map(|c| Some(c.dimension))
            .ok_or_else(|| VectorError::NotFound(collection.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_is_filtered_by_connection() {
        let store = MemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    DocPoint::documentation("a", "orders", "a orders", vec![1.0, 0.0]),
                    DocPoint::documentation("b", "orders", "b orders", vec![1.0, 0.0]),
                    DocPoint::documentation("a", "users", "a users", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("docs", vec![1.0, 0.1], "a", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.connection_id == "a"));
        assert_eq!(hits[0].entity_name, "orders");
        assert_eq!(store.count("docs", Some("b")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_found() {
        let store = MemoryVectorStore::new();
        let err = store.search("docs", vec![1.0], "a", 5).await.unwrap_err();
        assert!(matches!(err, VectorError::NotFound(_)));
        assert!(!store.delete_collection("docs").await.unwrap());
    }
}
