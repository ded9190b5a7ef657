//! # SchemaLens Graph
//!
//! Neo4j projection of the metadata ledger and structural analysis over it.
//!
//! Each connection's tables become `Entity` nodes and its columns `Field`
//! nodes, linked by `HAS_FIELD`. Foreign keys are stored twice: as
//! `REFERENCES_FIELD` between fields and as `REFERENCES` between the
//! owning entities. Every node carries its `connectionId`.

pub mod analytics;
pub mod client;
pub mod memory;
pub mod neo4j;
pub mod plan;
pub mod queries;
pub mod schema;
pub mod store;
pub mod sync;

pub use analytics::{ImpactReport, StructuralReport, structural_report};
pub use client::GraphClient;
pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jGraphStore;
pub use plan::{OrphanReason, OrphanedRelationship, SyncPlan};
pub use schema::initialize_schema;
pub use store::{ColumnInfo, EntityGraph, FieldRelation, GraphCounts, GraphStore};
pub use sync::{GraphSynchronizer, SyncReport};
