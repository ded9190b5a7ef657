//! Sync plans: the exact set of nodes and edges a connection's graph should
//! contain, derived from a ledger snapshot.
//!
//! Building a plan is pure and deterministic. Every graph store applies the
//! same plan, so the rules for what gets written live only here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use lens_core::{LedgerSnapshot, LensError, LensResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldNode {
    pub id: String,
    pub entity_id: String,
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
}

/// Why a relationship was left out of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrphanReason {
    SourceUnresolved,
    TargetUnresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedRelationship {
    pub relationship_id: String,
    pub source_field_id: String,
    pub target_field_id: String,
    pub reason: OrphanReason,
}

/// Nodes and edges for one connection.
///
/// `HAS_FIELD` edges are implied by `FieldNode::entity_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub connection_id: String,
    pub entities: Vec<EntityNode>,
    pub fields: Vec<FieldNode>,
    /// `(source field id, target field id)` for `REFERENCES_FIELD`.
    pub field_refs: Vec<(String, String)>,
    /// `(source entity id, target entity id)` for `REFERENCES`.
    pub entity_refs: Vec<(String, String)>,
    pub orphaned: Vec<OrphanedRelationship>,
    /// Field ids whose owning entity is not part of the connection.
    pub skipped_fields: Vec<String>,
}

impl SyncPlan {
    /// Derive the plan for `snapshot.connection_id`.
    ///
    /// Fails with `ConnectionIsolationViolation` if the snapshot carries an
    /// entity of another connection. Duplicate ids collapse to one node and
    /// duplicate relationships to one edge.
    pub fn build(snapshot: &LedgerSnapshot) -> LensResult<Self> {
        let conn = &snapshot.connection_id;

        let mut entities: BTreeMap<&str, EntityNode> = BTreeMap::new();
        for entity in &snapshot.entities {
            if &entity.connection_id != conn {
                return Err(LensError::ConnectionIsolationViolation {
                    expected: conn.clone(),
                    found: entity.connection_id.clone(),
                });
            }
            entities.insert(
                entity.id.as_str(),
                EntityNode {
                    id: entity.id.clone(),
                    name: entity.name.clone(),
                },
            );
        }

        let mut skipped_fields = Vec::new();
        // field id -> owning entity id
        let mut owner: HashMap<&str, &str> = HashMap::new();
        let mut fields: BTreeMap<&str, FieldNode> = BTreeMap::new();
        for field in &snapshot.fields {
            if !entities.contains_key(field.entity_id.as_str()) {
                skipped_fields.push(field.id.clone());
                continue;
            }
            owner.insert(field.id.as_str(), field.entity_id.as_str());
            fields.insert(
                field.id.as_str(),
                FieldNode {
                    id: field.id.clone(),
                    entity_id: field.entity_id.clone(),
                    name: field.name.clone(),
                    data_type: field.data_type.clone(),
                    is_nullable: field.is_nullable,
                    is_primary_key: field.is_primary_key,
                    is_foreign_key: false,
                },
            );
        }

        let mut orphaned = Vec::new();
        let mut field_refs = BTreeSet::new();
        let mut entity_refs = BTreeSet::new();
        for rel in &snapshot.relationships {
            let source = owner.get(rel.source_field_id.as_str());
            let target = owner.get(rel.target_field_id.as_str());
            let (source_entity, target_entity) = match (source, target) {
                (Some(s), Some(t)) => (*s, *t),
                (None, _) => {
                    orphaned.push(orphan(rel, OrphanReason::SourceUnresolved));
                    continue;
                }
                (_, None) => {
                    orphaned.push(orphan(rel, OrphanReason::TargetUnresolved));
                    continue;
                }
            };
            field_refs.insert((rel.source_field_id.clone(), rel.target_field_id.clone()));
            entity_refs.insert((source_entity.to_string(), target_entity.to_string()));
            if let Some(node) = fields.get_mut(rel.source_field_id.as_str()) {
                node.is_foreign_key = true;
            }
        }

        skipped_fields.sort();
        skipped_fields.dedup();

        Ok(Self {
            connection_id: conn.clone(),
            entities: entities.into_values().collect(),
            fields: fields.into_values().collect(),
            field_refs: field_refs.into_iter().collect(),
            entity_refs: entity_refs.into_iter().collect(),
            orphaned,
            skipped_fields,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn orphan(rel: &lens_core::Relationship, reason: OrphanReason) -> OrphanedRelationship {
    OrphanedRelationship {
        relationship_id: rel.id.clone(),
        source_field_id: rel.source_field_id.clone(),
        target_field_id: rel.target_field_id.clone(),
        reason,
    }
}
