//! Ledger backed by Redis.

use std::time::Duration;

use async_trait::async_trait;

use lens_core::{DocChunk, LensResult, LedgerSnapshot, with_deadline};

use crate::MetadataLedger;
use crate::client::RedisPool;
use crate::queries::{docs, metadata};

/// Reads and writes ledger rows through a shared connection manager.
#[derive(Clone)]
pub struct RedisLedger {
    pool: RedisPool,
    timeout: Duration,
}

impl RedisLedger {
    pub fn new(pool: RedisPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Connect to `redis_url` and wrap the pool.
    pub async fn connect(redis_url: &str, timeout: Duration) -> LensResult<Self> {
        let pool = with_deadline("redis connect", timeout, async {
            Ok(crate::client::init_pool(redis_url).await?)
        })
        .await?;
        Ok(Self::new(pool, timeout))
    }
}

#[async_trait]
impl MetadataLedger for RedisLedger {
    async fn snapshot(&self, connection_id: &str) -> LensResult<LedgerSnapshot> {
        with_deadline("ledger read", self.timeout, async {
            Ok(LedgerSnapshot {
                connection_id: connection_id.to_string(),
                entities: metadata::list_entities(&self.pool, connection_id).await?,
                fields: metadata::list_fields(&self.pool, connection_id).await?,
                relationships: metadata::list_relationships(&self.pool, connection_id).await?,
            })
        })
        .await
    }

    async fn doc_chunks(&self, connection_id: &str) -> LensResult<Vec<DocChunk>> {
        with_deadline("ledger read", self.timeout, async {
            Ok(docs::list_doc_chunks(&self.pool, connection_id).await?)
        })
        .await
    }

    async fn upsert_doc_chunk(&self, chunk: &DocChunk) -> LensResult<()> {
        with_deadline("ledger write", self.timeout, async {
            Ok(docs::upsert_doc_chunk(&self.pool, chunk).await?)
        })
        .await
    }

    async fn record_embedding(
        &self,
        connection_id: &str,
        entity_name: &str,
        embedding_id: &str,
    ) -> LensResult<()> {
        with_deadline("ledger write", self.timeout, async {
            let found =
                docs::set_embedding_id(&self.pool, connection_id, entity_name, embedding_id).await?;
            if !found {
                tracing::warn!(connection_id, entity = entity_name, "No doc chunk to record embedding on");
            }
            Ok(())
        })
        .await
    }

    async fn replace_snapshot(&self, snapshot: &LedgerSnapshot) -> LensResult<()> {
        with_deadline("ledger write", self.timeout, async {
            Ok(metadata::replace_metadata(&self.pool, snapshot).await?)
        })
        .await
    }

    async fn connections(&self) -> LensResult<Vec<String>> {
        with_deadline("ledger read", self.timeout, async {
            Ok(metadata::list_connections(&self.pool).await?)
        })
        .await
    }
}
