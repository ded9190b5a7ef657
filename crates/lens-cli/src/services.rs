//! Construction of the backing clients from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};

use lens_core::LensConfig;
use lens_embedding::{CollectionAdmin, OllamaClient, QdrantStore, VectorStore};
use lens_graph::Neo4jGraphStore;
use lens_ledger::{MetadataLedger, RedisLedger};

pub async fn ledger(config: &LensConfig) -> Result<Arc<dyn MetadataLedger>> {
    let ledger = RedisLedger::connect(&config.redis_url, config.timeouts.ledger())
        .await
        .context("Failed to connect to the metadata ledger. Is Redis running?")?;
    Ok(Arc::new(ledger))
}

pub async fn graph_store(config: &LensConfig) -> Result<Arc<Neo4jGraphStore>> {
    let store = Neo4jGraphStore::connect(&config.graph, config.timeouts.graph())
        .await
        .context("Failed to connect to Neo4j. Is it running?")?;
    Ok(Arc::new(store))
}

pub fn vector_store(config: &LensConfig) -> Result<Arc<dyn VectorStore>> {
    let store = QdrantStore::from_settings(&config.qdrant)?;
    Ok(Arc::new(store))
}

pub fn collection_admin(config: &LensConfig, store: Arc<dyn VectorStore>) -> CollectionAdmin {
    CollectionAdmin::new(
        store,
        &config.qdrant.collection,
        config.ollama.dimension,
        config.timeouts.vector(),
    )
}

pub fn embedder(config: &LensConfig) -> Arc<OllamaClient> {
    Arc::new(OllamaClient::from_settings(&config.ollama, config.timeouts.embed()))
}
