//! Graph store abstraction.
//!
//! The synchronizer writes through [`GraphStore::apply_plan`]; analytics and
//! retrieval read typed rows back. Every read takes the connection id and
//! never returns nodes of another connection.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use lens_core::LensResult;

use crate::plan::SyncPlan;

/// `source_entity.source_field references target_entity.target_field`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FieldRelation {
    pub source_entity: String,
    pub source_field: String,
    pub target_entity: String,
    pub target_field: String,
}

impl fmt::Display for FieldRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} references {}.{}",
            self.source_entity, self.source_field, self.target_entity, self.target_field
        )
    }
}

/// Entity-level view of one connection: names plus `REFERENCES` edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityGraph {
    pub connection_id: String,
    pub entities: Vec<String>,
    /// `(source entity name, target entity name)`.
    pub edges: Vec<(String, String)>,
}

/// One column of an entity as stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    /// `table.column` this column points at, if it is a foreign key.
    pub references: Option<String>,
}

/// Node and edge counts for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphCounts {
    pub entities: usize,
    pub fields: usize,
    pub has_field: usize,
    pub references_field: usize,
    pub references: usize,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Replace the connection's subgraph with `plan`, atomically.
    ///
    /// On error the previous subgraph must be left intact.
    async fn apply_plan(&self, plan: &SyncPlan) -> LensResult<()>;

    /// Field-level relations touching any of `entities`, in either direction.
    async fn field_relations(&self, connection_id: &str, entities: &[String]) -> LensResult<Vec<FieldRelation>>;

    async fn entity_graph(&self, connection_id: &str) -> LensResult<EntityGraph>;

    /// Columns of `entity`, ordered by name. Empty if the entity is unknown.
    async fn entity_schema(&self, connection_id: &str, entity: &str) -> LensResult<Vec<ColumnInfo>>;

    async fn counts(&self, connection_id: &str) -> LensResult<GraphCounts>;
}
