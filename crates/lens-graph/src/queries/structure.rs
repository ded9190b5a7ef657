//! Whole-connection structure reads.

use anyhow::Result;
use neo4rs::Query;

use crate::GraphClient;
use crate::client::column;
use crate::store::{EntityGraph, GraphCounts};

/// Entity names and `REFERENCES` edges of a connection.
pub async fn entity_graph(client: &GraphClient, connection_id: &str) -> Result<EntityGraph> {
    let names = Query::new(
        "MATCH (e:Entity {connectionId: $connectionId})
         RETURN e.name as name
         ORDER BY name"
            .to_string(),
    )
    .param("connectionId", connection_id);

    let edges = Query::new(
        "MATCH (a:Entity {connectionId: $connectionId})-[:REFERENCES]->(b:Entity {connectionId: $connectionId})
         RETURN a.name as source, b.name as target
         ORDER BY source, target"
            .to_string(),
    )
    .param("connectionId", connection_id);

    let entities = client
        .query(names)
        .await?
        .iter()
        .map(|row| column::<String>(row, "name"))
        .collect::<Result<Vec<_>>>()?;

    let edges = client
        .query(edges)
        .await?
        .iter()
        .map(|row| Ok((column::<String>(row, "source")?, column::<String>(row, "target")?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(EntityGraph {
        connection_id: connection_id.to_string(),
        entities,
        edges,
    })
}

const COUNT_QUERIES: [&str; 5] = [
    "MATCH (e:Entity {connectionId: $connectionId}) RETURN count(e) as n",
    "MATCH (f:Field {connectionId: $connectionId}) RETURN count(f) as n",
    "MATCH (:Entity {connectionId: $connectionId})-[r:HAS_FIELD]->(:Field) RETURN count(r) as n",
    "MATCH (:Field {connectionId: $connectionId})-[r:REFERENCES_FIELD]->(:Field) RETURN count(r) as n",
    "MATCH (:Entity {connectionId: $connectionId})-[r:REFERENCES]->(:Entity) RETURN count(r) as n",
];

/// Node and edge counts of a connection.
pub async fn counts(client: &GraphClient, connection_id: &str) -> Result<GraphCounts> {
    let mut values = [0usize; 5];
    for (slot, cypher) in values.iter_mut().zip(COUNT_QUERIES) {
        let query = Query::new(cypher.to_string()).param("connectionId", connection_id);
        let n: i64 = client.query_scalar(query, "n").await?.unwrap_or(0);
        *slot = usize::try_from(n).unwrap_or(0);
    }

    let [entities, fields, has_field, references_field, references] = values;
    Ok(GraphCounts {
        entities,
        fields,
        has_field,
        references_field,
        references,
    })
}
