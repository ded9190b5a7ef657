//! Field-level relation lookups used to expand retrieval context.

use anyhow::Result;
use neo4rs::Query;

use crate::GraphClient;
use crate::client::column;
use crate::store::{ColumnInfo, FieldRelation};

/// Foreign keys leaving or entering any of `entities`.
pub async fn field_relations(
    client: &GraphClient,
    connection_id: &str,
    entities: &[String],
) -> Result<Vec<FieldRelation>> {
    let query = Query::new(
        "MATCH (e:Entity {connectionId: $connectionId})-[:HAS_FIELD]->(f:Field)
               -[:REFERENCES_FIELD]->(fk:Field)<-[:HAS_FIELD]-(ref:Entity {connectionId: $connectionId})
         WHERE e.name IN $entities OR ref.name IN $entities
         RETURN DISTINCT e.name as sourceEntity, f.name as sourceField,
                ref.name as targetEntity, fk.name as targetField
         ORDER BY sourceEntity, sourceField, targetEntity, targetField"
            .to_string(),
    )
    .param("connectionId", connection_id)
    .param("entities", entities.to_vec());

    let rows = client.query(query).await?;
    rows.iter()
        .map(|row| {
            Ok(FieldRelation {
                source_entity: column(row, "sourceEntity")?,
                source_field: column(row, "sourceField")?,
                target_entity: column(row, "targetEntity")?,
                target_field: column(row, "targetField")?,
            })
        })
        .collect()
}

/// Columns of one entity with the first foreign key target of each.
pub async fn entity_schema(client: &GraphClient, connection_id: &str, entity: &str) -> Result<Vec<ColumnInfo>> {
    let query = Query::new(
        "MATCH (e:Entity {connectionId: $connectionId, name: $name})-[:HAS_FIELD]->(f:Field)
         OPTIONAL MATCH (f)-[:REFERENCES_FIELD]->(t:Field)<-[:HAS_FIELD]-(te:Entity)
         WITH f, collect(te.name + '.' + t.name) as targets
         RETURN f.name as name, f.type as type,
                coalesce(f.isNullable, true) as isNullable,
                coalesce(f.isPrimaryKey, false) as isPrimaryKey,
                coalesce(f.isForeignKey, false) as isForeignKey,
                targets[0] as references
         ORDER BY name"
            .to_string(),
    )
    .param("connectionId", connection_id)
    .param("name", entity);

    let rows = client.query(query).await?;
    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: column(row, "name")?,
                data_type: column(row, "type")?,
                is_nullable: column(row, "isNullable")?,
                is_primary_key: column(row, "isPrimaryKey")?,
                is_foreign_key: column(row, "isForeignKey")?,
                references: column::<Option<String>>(row, "references")?,
            })
        })
        .collect()
}
