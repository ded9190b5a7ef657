//! # SchemaLens Ledger
//!
//! Read access to the relational metadata ledger (entities, fields,
//! relationships and generated documentation) that every derived store is
//! rebuilt from.
//!
//! The ledger is owned elsewhere; this crate only needs to read it, record
//! embedding ids, and load operator-provided snapshots.

pub mod client;
pub mod import;
pub mod memory;
pub mod queries;
pub mod redis_ledger;

use async_trait::async_trait;

use lens_core::{DocChunk, LensResult, LedgerSnapshot};

pub use client::{RedisError, RedisPool, RedisResult, init_pool};
pub use import::{ImportFile, ImportReport, validate_snapshot};
pub use memory::MemoryLedger;
pub use redis_ledger::RedisLedger;

/// Access to the authoritative metadata for a connection.
#[async_trait]
pub trait MetadataLedger: Send + Sync {
    /// Entities, fields and relationships currently recorded for a connection.
    async fn snapshot(&self, connection_id: &str) -> LensResult<LedgerSnapshot>;

    /// Current documentation chunk per entity of a connection.
    async fn doc_chunks(&self, connection_id: &str) -> LensResult<Vec<DocChunk>>;

    /// Insert or replace the chunk for `(connection_id, entity_name)`.
    async fn upsert_doc_chunk(&self, chunk: &DocChunk) -> LensResult<()>;

    /// Remember which vector point now holds an entity's documentation.
    async fn record_embedding(
        &self,
        connection_id: &str,
        entity_name: &str,
        embedding_id: &str,
    ) -> LensResult<()>;

    /// Replace all metadata of `snapshot.connection_id` with a validated snapshot.
    async fn replace_snapshot(&self, snapshot: &LedgerSnapshot) -> LensResult<()>;

    /// Connection ids with any recorded metadata.
    async fn connections(&self) -> LensResult<Vec<String>>;
}
