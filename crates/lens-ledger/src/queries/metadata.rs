//! Entity, field and relationship rows in Redis.

use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;

use lens_core::{Entity, Field, LedgerSnapshot, Relationship};

use super::{CONNECTIONS_KEY, index_key, record_key};
use crate::client::{RedisPool, RedisResult};

const ENTITY: &str = "entity";
const FIELD: &str = "field";
const RELATIONSHIP: &str = "relationship";

/// Read every JSON row indexed under `lens:{conn}:{kind}s:all`.
pub(crate) async fn list_rows<T: DeserializeOwned>(
    pool: &RedisPool,
    connection_id: &str,
    kind: &str,
) -> RedisResult<Vec<T>> {
    let mut conn = pool.clone();
    let mut ids: Vec<String> = conn.smembers(index_key(connection_id, kind)).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    ids.sort();

    let mut pipe = redis::pipe();
    for id in &ids {
        pipe.hget(record_key(connection_id, kind, id), "data");
    }
    let rows: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

    let mut out = Vec::with_capacity(rows.len());
    for json in rows.into_iter().flatten() {
        out.push(serde_json::from_str(&json)?);
    }
    Ok(out)
}

pub async fn list_entities(pool: &RedisPool, connection_id: &str) -> RedisResult<Vec<Entity>> {
    let mut entities: Vec<Entity> = list_rows(pool, connection_id, ENTITY).await?;
    entities.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entities)
}

pub async fn list_fields(pool: &RedisPool, connection_id: &str) -> RedisResult<Vec<Field>> {
    list_rows(pool, connection_id, FIELD).await
}

pub async fn list_relationships(pool: &RedisPool, connection_id: &str) -> RedisResult<Vec<Relationship>> {
    list_rows(pool, connection_id, RELATIONSHIP).await
}

pub async fn list_connections(pool: &RedisPool) -> RedisResult<Vec<String>> {
    let mut conn = pool.clone();
    let mut ids: Vec<String> = conn.smembers(CONNECTIONS_KEY).await?;
    ids.sort();
    Ok(ids)
}

/// Replace entities, fields and relationships of one connection in a single
/// MULTI/EXEC block. Documentation chunks are left untouched.
pub async fn replace_metadata(pool: &RedisPool, snapshot: &LedgerSnapshot) -> RedisResult<()> {
    let connection_id = snapshot.connection_id.as_str();
    let mut conn = pool.clone();

    let mut pipe = redis::pipe();
    pipe.atomic();

    for kind in [ENTITY, FIELD, RELATIONSHIP] {
        let old: Vec<String> = conn.smembers(index_key(connection_id, kind)).await?;
        for id in &old {
            pipe.del(record_key(connection_id, kind, id)).ignore();
        }
        pipe.del(index_key(connection_id, kind)).ignore();
    }

    for entity in &snapshot.entities {
        stage_row(&mut pipe, connection_id, ENTITY, &entity.id, entity)?;
    }
    for field in &snapshot.fields {
        stage_row(&mut pipe, connection_id, FIELD, &field.id, field)?;
    }
    for rel in &snapshot.relationships {
        stage_row(&mut pipe, connection_id, RELATIONSHIP, &rel.id, rel)?;
    }
    pipe.sadd(CONNECTIONS_KEY, connection_id).ignore();

    let _: () = pipe.query_async(&mut conn).await?;
    Ok(())
}

fn stage_row<T: Serialize>(
    pipe: &mut redis::Pipeline,
    connection_id: &str,
    kind: &str,
    id: &str,
    row: &T,
) -> RedisResult<()> {
    pipe.hset(record_key(connection_id, kind, id), "data", serde_json::to_string(row)?)
        .ignore();
    pipe.sadd(index_key(connection_id, kind), id).ignore();
    Ok(())
}
