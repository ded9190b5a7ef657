//! Documentation collection lifecycle.
//!
//! The pipeline and the operator commands share one contract: a cosine
//! collection of the embedding dimension with a keyword index on
//! `connection_id`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use lens_core::{LensError, LensResult, with_deadline};

use crate::store::{CONNECTION_FIELD, VectorError, VectorStore};

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub exists: bool,
    pub points: u64,
    pub dimension: Option<usize>,
    pub indexed_fields: Vec<String>,
}

#[derive(Clone)]
pub struct CollectionAdmin {
    store: Arc<dyn VectorStore>,
    name: String,
    dimension: usize,
    timeout: Duration,
}

impl CollectionAdmin {
    pub fn new(store: Arc<dyn VectorStore>, name: &str, dimension: usize, timeout: Duration) -> Self {
        Self {
            store,
            name: name.to_string(),
            dimension,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Create the collection and its index if either is missing.
    pub async fn ensure(&self) -> LensResult<()> {
        with_deadline("vector provision", self.timeout, async {
            if !self.store.collection_exists(&self.name).await? {
                info!(collection = %self.name, dimension = self.dimension, "Collection missing, creating it");
                self.store.create_collection(&self.name, self.dimension).await?;
            }
            if !self.store.has_payload_index(&self.name, CONNECTION_FIELD).await? {
                self.store.create_payload_index(&self.name, CONNECTION_FIELD).await?;
            }
            Ok(())
        })
        .await
    }

    pub async fn create(&self) -> LensResult<()> {
        self.ensure().await
    }

    /// Add the `connection_id` index to an existing collection.
    pub async fn create_index(&self) -> LensResult<()> {
        with_deadline("vector provision", self.timeout, async {
            Ok(self.store.create_payload_index(&self.name, CONNECTION_FIELD).await?)
        })
        .await
    }

    /// Drop the whole collection. Returns whether it existed.
    pub async fn flush(&self) -> LensResult<bool> {
        with_deadline("vector delete", self.timeout, async {
            Ok(self.store.delete_collection(&self.name).await?)
        })
        .await
    }

    pub async fn info(&self) -> LensResult<CollectionInfo> {
        with_deadline("vector info", self.timeout, async {
            let mut info = CollectionInfo {
                name: self.name.clone(),
                exists: false,
                points: 0,
                dimension: None,
                indexed_fields: Vec::new(),
            };
            if !self.store.collection_exists(&self.name).await? {
                return Ok(info);
            }
            info.exists = true;
            info.points = self.store.count(&self.name, None).await?;
            info.dimension = self.store.dimension(&self.name).await?;
            info.indexed_fields = self.store.indexed_fields(&self.name).await?;
            Ok(info)
        })
        .await
    }

    /// Points stored for one connection; zero if the collection is gone.
    pub async fn count_for(&self, connection_id: &str) -> LensResult<u64> {
        with_deadline("vector count", self.timeout, async {
            match self.store.count(&self.name, Some(connection_id)).await {
                Ok(n) => Ok(n),
                Err(VectorError::NotFound(_)) => Ok(0),
                Err(e) => Err(LensError::from(e)),
            }
        })
        .await
    }
}
