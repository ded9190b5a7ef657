//! Qdrant vector store client.
//!
//! Manages the documentation collection, upserts vectors, and performs
//! connection-filtered similarity search via the qdrant-client gRPC library.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, Distance, FieldType,
    Filter, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
    point_id::PointIdOptions, value::Kind, vectors_config,
};
use qdrant_client::{Qdrant, QdrantError};
use tracing::{debug, info};

use lens_core::config::QdrantSettings;

use crate::store::{CONNECTION_FIELD, DocPoint, SearchHit, VectorError, VectorResult, VectorStore};

/// Qdrant vector store client for SchemaLens.
#[derive(Clone)]
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Create a new QdrantStore client.
    pub fn new(url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder.build().context("Failed to create Qdrant client")?;

        Ok(Self { client })
    }

    pub fn from_settings(settings: &QdrantSettings) -> anyhow::Result<Self> {
        Self::new(&settings.url, settings.api_key.as_deref())
    }
}

/// Qdrant reports a missing collection as a gRPC `NotFound` status.
fn is_not_found(err: &QdrantError) -> bool {
    err.to_string().to_lowercase().contains("not found") || format!("{err:?}").contains("NotFound")
}

fn classify(collection: &str, err: QdrantError, what: &'static str) -> VectorError {
    if is_not_found(&err) {
        VectorError::NotFound(collection.to_string())
    } else {
        VectorError::Backend(anyhow::Error::new(err).context(what))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, collection: &str) -> VectorResult<bool> {
        Ok(self
            .client
            .collection_exists(collection)
            .await
            .context("Failed to check collection")?)
    }

    async fn indexed_fields(&self, collection: &str) -> VectorResult<Vec<String>> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| classify(collection, e, "Failed to get collection info"))?;

        let mut fields: Vec<String> = info
            .result
            .map(|r| r.payload_schema.into_keys().collect())
            .unwrap_or_default();
        fields.sort();
        Ok(fields)
    }

    async fn create_collection(&self, collection: &str, dimension: usize) -> VectorResult<()> {
        if self.collection_exists(collection).await? {
            debug!(collection, "Collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .context("Failed to create collection")?;

        info!(collection, dimension, "Created Qdrant collection");
        Ok(())
    }

    async fn create_payload_index(&self, collection: &str, field: &str) -> VectorResult<()> {
        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(collection, field, FieldType::Keyword).wait(true),
            )
            .await
            .map_err(|e| classify(collection, e, "Failed to create payload index"))?;

        info!(collection, field, "Created payload index");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<DocPoint>) -> VectorResult<()> {
        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = serde_json::to_value(&p.payload).unwrap_or_default();
                PointStruct::new(p.id, p.vector, json_to_payload(&payload))
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| classify(collection, e, "Failed to upsert points"))?;

        debug!(collection, count, "Upserted vectors");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        connection_id: &str,
        limit: u64,
    ) -> VectorResult<Vec<SearchHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector, limit)
                    .filter(Filter::must([Condition::matches(
                        CONNECTION_FIELD,
                        connection_id.to_string(),
                    )]))
                    .with_payload(true),
            )
            .await
            .map_err(|e| classify(collection, e, "Failed to search points"))?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let id = match point.id.and_then(|id| id.point_id_options) {
                    Some(PointIdOptions::Uuid(u)) => u,
                    Some(PointIdOptions::Num(n)) => n.to_string(),
                    None => String::new(),
                };
                let payload = payload_to_json(&point.payload);
                let field = |key: &str| payload.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
                SearchHit {
                    id,
                    score: point.score,
                    connection_id: field("connection_id"),
                    entity_name: field("entity_name"),
                    content: field("content"),
                }
            })
            .collect();

        Ok(hits)
    }

    async fn delete_collection(&self, collection: &str) -> VectorResult<bool> {
        if !self.collection_exists(collection).await? {
            return Ok(false);
        }
        self.client
            .delete_collection(collection)
            .await
            .context("Failed to delete collection")?;
        info!(collection, "Deleted Qdrant collection");
        Ok(true)
    }

    async fn count(&self, collection: &str, connection_id: Option<&str>) -> VectorResult<u64> {
        let mut request = CountPointsBuilder::new(collection).exact(true);
        if let Some(conn) = connection_id {
            request = request.filter(Filter::must([Condition::matches(CONNECTION_FIELD, conn.to_string())]));
        }

        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| classify(collection, e, "Failed to count points"))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn dimension(&self, collection: &str) -> VectorResult<Option<usize>> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| classify(collection, e, "Failed to get collection info"))?;

        let config = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        Ok(match config {
            Some(vectors_config::Config::Params(params)) => Some(params.size as usize),
            Some(vectors_config::Config::ParamsMap(map)) => map.map.values().next().map(|p| p.size as usize),
            None => None,
        })
    }
}

/// Convert a serde_json::Value to Qdrant payload (HashMap<String, Value>).
fn json_to_payload(json: &serde_json::Value) -> HashMap<String, Value> {
    let mut payload = HashMap::new();

    if let serde_json::Value::Object(map) = json {
        for (key, val) in map {
            if let Some(qdrant_val) = json_value_to_qdrant(val) {
                payload.insert(key.clone(), qdrant_val);
            }
        }
    }

    payload
}

fn json_value_to_qdrant(val: &serde_json::Value) -> Option<Value> {
    let kind = match val {
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64()?),
        },
        _ => return None,
    };
    Some(Value { kind: Some(kind) })
}

/// Convert Qdrant payload back to serde_json::Value.
fn payload_to_json(payload: &HashMap<String, Value>) -> serde_json::Value {
    let mut map = serde_json::Map::new();

    for (key, val) in payload {
        if let Some(kind) = &val.kind {
            let json_val = match kind {
                Kind::StringValue(s) => serde_json::Value::String(s.clone()),
                Kind::DoubleValue(f) => serde_json::json!(*f),
                Kind::IntegerValue(i) => serde_json::json!(*i),
                Kind::BoolValue(b) => serde_json::Value::Bool(*b),
                _ => continue,
            };
            map.insert(key.clone(), json_val);
        }
    }

    serde_json::Value::Object(map)
}
