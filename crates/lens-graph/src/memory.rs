//! In-process [`GraphStore`] for tests and dry runs.
//!
//! Each connection's subgraph is held as its last applied plan. Applying a
//! plan swaps the whole entry, so a failed apply leaves the previous
//! subgraph untouched, like a rolled back Neo4j transaction.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use lens_core::{LensError, LensResult};

use crate::plan::SyncPlan;
use crate::store::{ColumnInfo, EntityGraph, FieldRelation, GraphCounts, GraphStore};

#[derive(Default)]
pub struct MemoryGraphStore {
    graphs: Mutex<HashMap<String, SyncPlan>>,
    fail_applies: AtomicBool,
    apply_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every apply for `delay` before committing.
    pub fn with_apply_delay(delay: Duration) -> Self {
        Self {
            apply_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make every following apply fail until reset.
    pub fn fail_applies(&self, fail: bool) {
        self.fail_applies.store(fail, Ordering::SeqCst);
    }

    /// Highest number of applies observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// The plan currently materialized for a connection.
    pub fn plan(&self, connection_id: &str) -> Option<SyncPlan> {
        self.graphs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(connection_id)
            .cloned()
    }

    fn with_plan<T>(&self, connection_id: &str, f: impl FnOnce(Option<&SyncPlan>) -> T) -> T {
        let graphs = self.graphs.lock().unwrap_or_else(PoisonError::into_inner);
        f(graphs.get(connection_id))
    }

    fn commit(&self, plan: &SyncPlan) -> LensResult<()> {
        if self.fail_applies.load(Ordering::SeqCst) {
            return Err(LensError::graph(anyhow::anyhow!(
                "write failed for connection '{}'",
                plan.connection_id
            )));
        }

        let mut graphs = self.graphs.lock().unwrap_or_else(PoisonError::into_inner);

        // Node ids are globally unique, as under the Neo4j constraints.
        for (conn, other) in graphs.iter() {
            if conn == &plan.connection_id {
                continue;
            }
            let taken: BTreeSet<&str> = other
                .entities
                .iter()
                .map(|e| e.id.as_str())
                .chain(other.fields.iter().map(|f| f.id.as_str()))
                .collect();
            let clash = plan
                .entities
                .iter()
                .map(|e| e.id.as_str())
                .chain(plan.fields.iter().map(|f| f.id.as_str()))
                .find(|id| taken.contains(id));
            if let Some(id) = clash {
                return Err(LensError::graph(anyhow::anyhow!(
                    "node '{}' already exists in connection '{}'",
                    id,
                    conn
                )));
            }
        }

        graphs.insert(plan.connection_id.clone(), plan.clone());
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn apply_plan(&self, plan: &SyncPlan) -> LensResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.commit(plan);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn field_relations(&self, connection_id: &str, entities: &[String]) -> LensResult<Vec<FieldRelation>> {
        Ok(self.with_plan(connection_id, |plan| {
            let Some(plan) = plan else { return Vec::new() };
            let names = entity_names(plan);
            let fields: HashMap<&str, (&str, &str)> = plan
                .fields
                .iter()
                .map(|f| (f.id.as_str(), (names[f.entity_id.as_str()], f.name.as_str())))
                .collect();

            let mut out = BTreeSet::new();
            for (source, target) in &plan.field_refs {
                let (Some(&(se, sf)), Some(&(te, tf))) = (fields.get(source.as_str()), fields.get(target.as_str()))
                else {
                    continue;
                };
                if entities.iter().any(|e| e == se || e == te) {
                    out.insert(FieldRelation {
                        source_entity: se.to_string(),
                        source_field: sf.to_string(),
                        target_entity: te.to_string(),
                        target_field: tf.to_string(),
                    });
                }
            }
            out.into_iter().collect()
        }))
    }

    async fn entity_graph(&self, connection_id: &str) -> LensResult<EntityGraph> {
        Ok(self.with_plan(connection_id, |plan| {
            let Some(plan) = plan else {
                return EntityGraph {
                    connection_id: connection_id.to_string(),
                    ..EntityGraph::default()
                };
            };
            let names = entity_names(plan);
            let mut entities: Vec<String> = plan.entities.iter().map(|e| e.name.clone()).collect();
            entities.sort();
            let mut edges: Vec<(String, String)> = plan
                .entity_refs
                .iter()
                .map(|(s, t)| (names[s.as_str()].to_string(), names[t.as_str()].to_string()))
                .collect();
            edges.sort();
            EntityGraph {
                connection_id: connection_id.to_string(),
                entities,
                edges,
            }
        }))
    }

    async fn entity_schema(&self, connection_id: &str, entity: &str) -> LensResult<Vec<ColumnInfo>> {
        Ok(self.with_plan(connection_id, |plan| {
            let Some(plan) = plan else { return Vec::new() };
            let Some(owner) = plan.entities.iter().find(|e| e.name == entity) else {
                return Vec::new();
            };
            let names = entity_names(plan);
            let qualified: HashMap<&str, String> = plan
                .fields
                .iter()
                .map(|f| (f.id.as_str(), format!("{}.{}", names[f.entity_id.as_str()], f.name)))
                .collect();

            let mut columns: Vec<ColumnInfo> = plan
                .fields
                .iter()
                .filter(|f| f.entity_id == owner.id)
                .map(|f| ColumnInfo {
                    name: f.name.clone(),
                    data_type: f.data_type.clone(),
                    is_nullable: f.is_nullable,
                    is_primary_key: f.is_primary_key,
                    is_foreign_key: f.is_foreign_key,
                    references: plan
                        .field_refs
                        .iter()
                        .find(|(s, _)| s == &f.id)
                        .and_then(|(_, t)| qualified.get(t.as_str()).cloned()),
                })
                .collect();
            columns.sort_by(|a, b| a.name.cmp(&b.name));
            columns
        }))
    }

    async fn counts(&self, connection_id: &str) -> LensResult<GraphCounts> {
        Ok(self.with_plan(connection_id, |plan| match plan {
            Some(plan) => GraphCounts {
                entities: plan.entities.len(),
                fields: plan.fields.len(),
                has_field: plan.fields.len(),
                references_field: plan.field_refs.len(),
                references: plan.entity_refs.len(),
            },
            None => GraphCounts::default(),
        }))
    }
}

fn entity_names(plan: &SyncPlan) -> HashMap<&str, &str> {
    plan.entities
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::fixtures::*;

    #[tokio::test]
    async fn test_relations_expand_in_both_directions() {
        let store = MemoryGraphStore::new();
        store.apply_plan(&SyncPlan::build(&orders_customers("c1")).unwrap()).await.unwrap();

        for seed in ["orders", "customers"] {
            let rels = store.field_relations("c1", &[seed.to_string()]).await.unwrap();
            assert_eq!(rels.len(), 1, "seed {seed}");
            assert_eq!(rels[0].to_string(), "orders.customer_id references customers.id");
        }
    }

    #[tokio::test]
    async fn test_entity_schema_reports_reference_target() {
        let store = MemoryGraphStore::new();
        store.apply_plan(&SyncPlan::build(&orders_customers("c1")).unwrap()).await.unwrap();

        let columns = store.entity_schema("c1", "orders").await.unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["customer_id", "id"]);
        assert_eq!(columns[0].references.as_deref(), Some("customers.id"));
        assert!(store.entity_schema("c1", "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_previous_graph() {
        let store = MemoryGraphStore::new();
        store.apply_plan(&SyncPlan::build(&users_only("c1")).unwrap()).await.unwrap();

        store.fail_applies(true);
        let err = store.apply_plan(&SyncPlan::build(&orders_customers("c1")).unwrap()).await;
        assert!(err.is_err());

        let counts = store.counts("c1").await.unwrap();
        assert_eq!(counts.entities, 1);
        assert_eq!(counts.fields, 2);
    }

    #[tokio::test]
    async fn test_node_id_owned_by_another_connection_is_refused() {
        let store = MemoryGraphStore::new();
        store.apply_plan(&SyncPlan::build(&users_only("a")).unwrap()).await.unwrap();

        let mut snapshot = users_only("b");
        snapshot.entities[0].id = "a:users".into();
        for f in &mut snapshot.fields {
            f.entity_id = "a:users".into();
        }
        let err = store.apply_plan(&SyncPlan::build(&snapshot).unwrap()).await.unwrap_err();
        assert!(matches!(err, LensError::GraphStore(_)));
        assert!(store.plan("b").is_none());
    }
}
