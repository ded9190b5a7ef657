//! Vector store abstraction and the documentation point format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use lens_core::LensError;

/// Payload field every search is filtered on.
pub const CONNECTION_FIELD: &str = "connection_id";

/// Value of the `type` payload field for documentation points.
pub const DOCUMENTATION_TYPE: &str = "documentation";

/// Namespace for documentation point ids.
pub const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x0ea2b2f2_67a0_4d67_95f0_9b8a99c9605c);

/// Deterministic point id for an entity's documentation.
///
/// Re-embedding the same entity overwrites its point instead of adding one.
pub fn point_id(connection_id: &str, entity_name: &str) -> String {
    Uuid::new_v5(&POINT_NAMESPACE, format!("{connection_id}-{entity_name}").as_bytes()).to_string()
}

#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Collection '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type VectorResult<T> = Result<T, VectorError>;

impl From<VectorError> for LensError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::NotFound(collection) => LensError::CollectionMissing(collection),
            VectorError::Backend(e) => LensError::VectorStore(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocPayload {
    pub connection_id: String,
    pub entity_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: DocPayload,
}

impl DocPoint {
    pub fn documentation(connection_id: &str, entity_name: &str, content: &str, vector: Vec<f32>) -> Self {
        Self {
            id: point_id(connection_id, entity_name),
            vector,
            payload: DocPayload {
                connection_id: connection_id.to_string(),
                entity_name: entity_name.to_string(),
                content: content.to_string(),
                kind: DOCUMENTATION_TYPE.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub connection_id: String,
    pub entity_name: String,
    pub content: String,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> VectorResult<bool>;

    /// Payload fields with an index. `NotFound` if the collection is missing.
    async fn indexed_fields(&self, collection: &str) -> VectorResult<Vec<String>>;

    async fn has_payload_index(&self, collection: &str, field: &str) -> VectorResult<bool> {
        Ok(self.indexed_fields(collection).await?.iter().any(|f| f == field))
    }

    /// Create a cosine collection of `dimension`. Existing collections are left alone.
    async fn create_collection(&self, collection: &str, dimension: usize) -> VectorResult<()>;

    /// Create a keyword index on `field`.
    async fn create_payload_index(&self, collection: &str, field: &str) -> VectorResult<()>;

    /// Insert or overwrite points, returning once they are durable.
    async fn upsert(&self, collection: &str, points: Vec<DocPoint>) -> VectorResult<()>;

    /// Nearest points whose `connection_id` equals `connection_id`.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        connection_id: &str,
        limit: u64,
    ) -> VectorResult<Vec<SearchHit>>;

    /// Returns whether a collection was dropped.
    async fn delete_collection(&self, collection: &str) -> VectorResult<bool>;

    /// Points in the collection, or only those of one connection.
    async fn count(&self, collection: &str, connection_id: Option<&str>) -> VectorResult<u64>;

    /// Configured vector size of the collection.
    async fn dimension(&self, collection: &str) -> VectorResult<Option<usize>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_stable_and_scoped() {
        let a = point_id("conn-1", "orders");
        assert_eq!(a, point_id("conn-1", "orders"));
        assert_ne!(a, point_id("conn-2", "orders"));
        assert_ne!(a, point_id("conn-1", "customers"));
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 5);
    }

    #[test]
    fn test_not_found_maps_to_collection_missing() {
        let err: LensError = VectorError::NotFound("schema_documentation".into()).into();
        assert!(matches!(err, LensError::CollectionMissing(ref c) if c == "schema_documentation"));
    }
}
