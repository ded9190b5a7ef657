//! Ledger to graph synchronization.
//!
//! A sync reads the connection's ledger snapshot, derives a [`SyncPlan`]
//! and replaces the connection's subgraph with it in one write. Runs for
//! the same connection are serialized; different connections proceed
//! independently.

pub mod statements;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use lens_core::{ConnectionLocks, LensError, LensResult};
use lens_ledger::MetadataLedger;

use crate::plan::{OrphanedRelationship, SyncPlan};
use crate::store::GraphStore;

/// Outcome of a successful sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub connection_id: String,
    pub entities: usize,
    pub fields: usize,
    pub field_references: usize,
    pub entity_references: usize,
    /// Relationships left out because an endpoint is missing.
    pub orphaned: Vec<OrphanedRelationship>,
    pub skipped_fields: Vec<String>,
    pub elapsed_ms: u128,
}

impl SyncReport {
    fn from_plan(plan: &SyncPlan, started: Instant) -> Self {
        Self {
            connection_id: plan.connection_id.clone(),
            entities: plan.entities.len(),
            fields: plan.fields.len(),
            field_references: plan.field_refs.len(),
            entity_references: plan.entity_refs.len(),
            orphaned: plan.orphaned.clone(),
            skipped_fields: plan.skipped_fields.clone(),
            elapsed_ms: started.elapsed().as_millis(),
        }
    }
}

/// Rebuilds graph projections from the ledger.
#[derive(Clone)]
pub struct GraphSynchronizer {
    ledger: Arc<dyn MetadataLedger>,
    store: Arc<dyn GraphStore>,
    locks: ConnectionLocks,
}

impl GraphSynchronizer {
    pub fn new(ledger: Arc<dyn MetadataLedger>, store: Arc<dyn GraphStore>) -> Self {
        Self::with_locks(ledger, store, ConnectionLocks::new())
    }

    /// Share a lock table with other synchronizers.
    pub fn with_locks(ledger: Arc<dyn MetadataLedger>, store: Arc<dyn GraphStore>, locks: ConnectionLocks) -> Self {
        Self { ledger, store, locks }
    }

    /// Make the graph for `connection_id` mirror the ledger exactly.
    pub async fn sync_connection(&self, connection_id: &str) -> LensResult<SyncReport> {
        let _guard = self.locks.acquire(connection_id).await;
        let started = Instant::now();
        info!(connection_id, "Starting graph sync");

        let snapshot = self.ledger.snapshot(connection_id).await?;
        if snapshot.connection_id != connection_id {
            return Err(LensError::ConnectionIsolationViolation {
                expected: connection_id.to_string(),
                found: snapshot.connection_id,
            });
        }
        if snapshot.is_empty() {
            return Err(LensError::NoMetadataSynced(connection_id.to_string()));
        }

        let plan = SyncPlan::build(&snapshot)?;
        for orphan in &plan.orphaned {
            warn!(
                connection_id,
                relationship = %orphan.relationship_id,
                source = %orphan.source_field_id,
                target = %orphan.target_field_id,
                reason = ?orphan.reason,
                "Skipping relationship with unresolved endpoint"
            );
        }
        if !plan.skipped_fields.is_empty() {
            warn!(connection_id, count = plan.skipped_fields.len(), "Skipping fields of unknown entities");
        }

        self.store.apply_plan(&plan).await?;

        let report = SyncReport::from_plan(&plan, started);
        info!(
            connection_id,
            entities = report.entities,
            fields = report.fields,
            references = report.entity_references,
            orphaned = report.orphaned.len(),
            elapsed_ms = report.elapsed_ms as u64,
            "Graph sync complete"
        );
        Ok(report)
    }

    /// Sync every connection the ledger knows about, continuing past failures.
    pub async fn sync_all(&self) -> LensResult<Vec<(String, LensResult<SyncReport>)>> {
        let connections = self.ledger.connections().await?;
        let mut results = Vec::with_capacity(connections.len());
        for conn in connections {
            let result = self.sync_connection(&conn).await;
            if let Err(e) = &result {
                warn!(connection_id = %conn, error = %e, "Graph sync failed");
            }
            results.push((conn, result));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lens_ledger::MemoryLedger;

    use super::*;
    use crate::memory::MemoryGraphStore;
    use crate::plan::fixtures::*;
    use crate::store::GraphStore;

    fn setup(snapshots: Vec<lens_core::LedgerSnapshot>) -> (GraphSynchronizer, Arc<MemoryLedger>, Arc<MemoryGraphStore>) {
        let ledger = Arc::new(MemoryLedger::with_snapshots(snapshots));
        let store = Arc::new(MemoryGraphStore::new());
        let sync = GraphSynchronizer::new(ledger.clone(), store.clone());
        (sync, ledger, store)
    }

    #[tokio::test]
    async fn test_single_table_without_relationships() {
        let (sync, _, store) = setup(vec![users_only("c1")]);

        let report = sync.sync_connection("c1").await.unwrap();
        assert_eq!(report.entities, 1);
        assert_eq!(report.fields, 2);

        let counts = store.counts("c1").await.unwrap();
        assert_eq!(counts.entities, 1);
        assert_eq!(counts.fields, 2);
        assert_eq!(counts.has_field, 2);
        assert_eq!(counts.references, 0);
    }

    #[tokio::test]
    async fn test_foreign_key_creates_both_edge_levels() {
        let (sync, _, store) = setup(vec![orders_customers("c1")]);
        sync.sync_connection("c1").await.unwrap();

        let counts = store.counts("c1").await.unwrap();
        assert_eq!(counts.references_field, 1);
        assert_eq!(counts.references, 1);

        let graph = store.entity_graph("c1").await.unwrap();
        assert_eq!(graph.edges, vec![("orders".to_string(), "customers".to_string())]);
        let schema = store.entity_schema("c1", "orders").await.unwrap();
        assert!(schema.iter().any(|c| c.name == "customer_id" && c.is_foreign_key));
    }

    #[tokio::test]
    async fn test_resync_is_idempotent_and_drops_removed_entities() {
        let (sync, ledger, store) = setup(vec![orders_customers("c1")]);
        sync.sync_connection("c1").await.unwrap();
        let first = store.plan("c1");
        sync.sync_connection("c1").await.unwrap();
        assert_eq!(store.plan("c1"), first);

        ledger.replace_snapshot(&users_only("c1")).await.unwrap();
        sync.sync_connection("c1").await.unwrap();
        let graph = store.entity_graph("c1").await.unwrap();
        assert_eq!(graph.entities, vec!["users".to_string()]);
        assert!(graph.edges.is_empty());
    }

    #[tokio::test]
    async fn test_sync_leaves_other_connections_untouched() {
        let (sync, _, store) = setup(vec![users_only("a"), orders_customers("b")]);
        sync.sync_connection("a").await.unwrap();
        sync.sync_connection("b").await.unwrap();
        let before = store.plan("a");

        sync.sync_connection("b").await.unwrap();
        assert_eq!(store.plan("a"), before);
        assert!(store.field_relations("a", &["orders".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ledger_reports_no_metadata() {
        let (sync, _, _) = setup(vec![]);
        let err = sync.sync_connection("ghost").await.unwrap_err();
        assert!(matches!(err, LensError::NoMetadataSynced(ref c) if c == "ghost"));
    }

    #[tokio::test]
    async fn test_orphaned_relationship_is_reported_not_fatal() {
        let mut snapshot = orders_customers("c1");
        snapshot.relationships.push(fk("c1", "orders.id", "invoices.id"));
        let (sync, _, store) = setup(vec![snapshot]);

        let report = sync.sync_connection("c1").await.unwrap();
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.entity_references, 1);
        assert_eq!(store.counts("c1").await.unwrap().references_field, 1);
    }

    #[tokio::test]
    async fn test_failed_write_preserves_previous_graph() {
        let (sync, ledger, store) = setup(vec![users_only("c1")]);
        sync.sync_connection("c1").await.unwrap();
        let before = store.plan("c1");

        ledger.replace_snapshot(&orders_customers("c1")).await.unwrap();
        store.fail_applies(true);
        assert!(sync.sync_connection("c1").await.is_err());
        assert_eq!(store.plan("c1"), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_syncs_of_one_connection_are_serialized() {
        let ledger = Arc::new(MemoryLedger::with_snapshots(vec![orders_customers("c1"), users_only("c2")]));
        let store = Arc::new(MemoryGraphStore::with_apply_delay(Duration::from_millis(50)));
        let sync = GraphSynchronizer::new(ledger, store.clone());

        let (a, b) = tokio::join!(sync.sync_connection("c1"), sync.sync_connection("c1"));
        a.unwrap();
        b.unwrap();
        assert_eq!(store.max_in_flight(), 1);

        let (c, d) = tokio::join!(sync.sync_connection("c1"), sync.sync_connection("c2"));
        c.unwrap();
        d.unwrap();
        assert_eq!(store.max_in_flight(), 2);
    }
}
