//! Key layout and query modules for ledger records stored in Redis.
//!
//! ```text
//! lens:connections:all                    SET of connection ids
//! lens:{conn}:entity:{id}                 HASH data=<Entity json>
//! lens:{conn}:field:{id}                  HASH data=<Field json>
//! lens:{conn}:relationship:{id}           HASH data=<Relationship json>
//! lens:{conn}:doc:{entity_name}           HASH data=<DocChunk json> embedding_id=<point id>
//! lens:{conn}:{kind}s:all                 SET of ids (entity names for docs)
//! ```

pub mod docs;
pub mod metadata;

pub(crate) const CONNECTIONS_KEY: &str = "lens:connections:all";

pub(crate) fn record_key(connection_id: &str, kind: &str, id: &str) -> String {
    format!("lens:{}:{}:{}", connection_id, kind, id)
}

pub(crate) fn index_key(connection_id: &str, kind: &str) -> String {
    format!("lens:{}:{}s:all", connection_id, kind)
}
