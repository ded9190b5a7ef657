//! In-process ledger, used by tests and by callers that already hold the
//! metadata in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use lens_core::{DocChunk, LensResult, LedgerSnapshot};

use crate::MetadataLedger;

#[derive(Default)]
struct Tables {
    snapshots: HashMap<String, LedgerSnapshot>,
    // (connection, entity name) -> chunk
    docs: BTreeMap<(String, String), DocChunk>,
}

#[derive(Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger holding the given snapshots.
    pub fn with_snapshots(snapshots: impl IntoIterator<Item = LedgerSnapshot>) -> Self {
        let ledger = Self::new();
        {
            let mut tables = ledger.tables.write().unwrap_or_else(PoisonError::into_inner);
            for s in snapshots {
                tables.snapshots.insert(s.connection_id.clone(), s);
            }
        }
        ledger
    }
}

#[async_trait]
impl MetadataLedger for MemoryLedger {
    async fn snapshot(&self, connection_id: &str) -> LensResult<LedgerSnapshot> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .snapshots
            .get(connection_id)
            .cloned()
            .unwrap_or_else(|| LedgerSnapshot::new(connection_id)))
    }

    async fn doc_chunks(&self, connection_id: &str) -> LensResult<Vec<DocChunk>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .docs
            .iter()
            .filter(|((conn, _), _)| conn == connection_id)
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }

    async fn upsert_doc_chunk(&self, chunk: &DocChunk) -> LensResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.docs.insert(
            (chunk.connection_id.clone(), chunk.entity_name.clone()),
            chunk.clone(),
        );
        Ok(())
    }

    async fn record_embedding(
        &self,
        connection_id: &str,
        entity_name: &str,
        embedding_id: &str,
    ) -> LensResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(chunk) = tables
            .docs
            .get_mut(&(connection_id.to_string(), entity_name.to_string()))
        {
            chunk.embedding_id = Some(embedding_id.to_string());
        }
        Ok(())
    }

    async fn replace_snapshot(&self, snapshot: &LedgerSnapshot) -> LensResult<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables
            .snapshots
            .insert(snapshot.connection_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn connections(&self) -> LensResult<Vec<String>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = tables.snapshots.keys().cloned().collect();
        for (conn, _) in tables.docs.keys() {
            if !ids.contains(conn) {
                ids.push(conn.clone());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_doc_chunk_upsert_keeps_one_per_entity() {
        let ledger = MemoryLedger::new();
        ledger.upsert_doc_chunk(&DocChunk::new("c1", "orders", "v1")).await.unwrap();
        ledger.upsert_doc_chunk(&DocChunk::new("c1", "orders", "v2")).await.unwrap();
        ledger.upsert_doc_chunk(&DocChunk::new("c2", "orders", "other")).await.unwrap();

        let chunks = ledger.doc_chunks("c1").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].markdown, "v2");
    }

    #[tokio::test]
    async fn test_record_embedding_sets_id() {
        let ledger = MemoryLedger::new();
        ledger.upsert_doc_chunk(&DocChunk::new("c1", "orders", "text")).await.unwrap();
        ledger.record_embedding("c1", "orders", "point-1").await.unwrap();

        let chunks = ledger.doc_chunks("c1").await.unwrap();
        assert_eq!(chunks[0].embedding_id.as_deref(), Some("point-1"));
    }

    #[tokio::test]
    async fn test_unknown_connection_has_empty_snapshot() {
        let ledger = MemoryLedger::new();
        let snapshot = ledger.snapshot("missing").await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.connection_id, "missing");
    }
}
