//! Cypher statements that materialize a [`SyncPlan`].
//!
//! Statements are plain data until they are handed to neo4rs, so the write
//! set of a plan can be inspected without a database.

use neo4rs::Query;

use crate::plan::SyncPlan;

pub const DELETE_FIELDS: &str = "MATCH (f:Field {connectionId: $connectionId}) DETACH DELETE f";

pub const DELETE_ENTITIES: &str = "MATCH (e:Entity {connectionId: $connectionId}) DETACH DELETE e";

pub const MERGE_ENTITY: &str = "MERGE (e:Entity {id: $id, connectionId: $connectionId})
     SET e.name = $name";

pub const MERGE_FIELD: &str = "MATCH (e:Entity {id: $entityId, connectionId: $connectionId})
     MERGE (f:Field {id: $id, connectionId: $connectionId})
     SET f.name = $name,
         f.type = $type,
         f.isNullable = $isNullable,
         f.isPrimaryKey = $isPrimaryKey,
         f.isForeignKey = $isForeignKey
     MERGE (e)-[:HAS_FIELD]->(f)";

pub const MERGE_FIELD_REF: &str = "MATCH (s:Field {id: $sourceId, connectionId: $connectionId})
     MATCH (t:Field {id: $targetId, connectionId: $connectionId})
     MERGE (s)-[:REFERENCES_FIELD]->(t)";

pub const MERGE_ENTITY_REF: &str = "MATCH (s:Entity {id: $sourceId, connectionId: $connectionId})
     MATCH (t:Entity {id: $targetId, connectionId: $connectionId})
     MERGE (s)-[:REFERENCES]->(t)";

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: &'static str,
    pub params: Vec<(&'static str, ParamValue)>,
}

impl Statement {
    fn new(cypher: &'static str, connection_id: &str) -> Self {
        Self {
            cypher,
            params: vec![("connectionId", ParamValue::Str(connection_id.to_string()))],
        }
    }

    fn str(mut self, key: &'static str, value: &str) -> Self {
        self.params.push((key, ParamValue::Str(value.to_string())));
        self
    }

    fn bool(mut self, key: &'static str, value: bool) -> Self {
        self.params.push((key, ParamValue::Bool(value)));
        self
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn into_query(self) -> Query {
        self.params
            .into_iter()
            .fold(Query::new(self.cypher.to_string()), |q, (key, value)| match value {
                ParamValue::Str(s) => q.param(key, s),
                ParamValue::Bool(b) => q.param(key, b),
            })
    }
}

/// Statements that rebuild the plan's connection from scratch.
///
/// The old subgraph is deleted first; run them in one transaction.
pub fn plan_statements(plan: &SyncPlan) -> Vec<Statement> {
    let conn = plan.connection_id.as_str();
    let mut out = Vec::with_capacity(
        2 + plan.entities.len() + plan.fields.len() + plan.field_refs.len() + plan.entity_refs.len(),
    );

    out.push(Statement::new(DELETE_FIELDS, conn));
    out.push(Statement::new(DELETE_ENTITIES, conn));

    for entity in &plan.entities {
        out.push(Statement::new(MERGE_ENTITY, conn).str("id", &entity.id).str("name", &entity.name));
    }

    for field in &plan.fields {
        out.push(
            Statement::new(MERGE_FIELD, conn)
                .str("entityId", &field.entity_id)
                .str("id", &field.id)
                .str("name", &field.name)
                .str("type", &field.data_type)
                .bool("isNullable", field.is_nullable)
                .bool("isPrimaryKey", field.is_primary_key)
                .bool("isForeignKey", field.is_foreign_key),
        );
    }

    for (source, target) in &plan.field_refs {
        out.push(Statement::new(MERGE_FIELD_REF, conn).str("sourceId", source).str("targetId", target));
    }

    for (source, target) in &plan.entity_refs {
        out.push(Statement::new(MERGE_ENTITY_REF, conn).str("sourceId", source).str("targetId", target));
    }

    out
}
