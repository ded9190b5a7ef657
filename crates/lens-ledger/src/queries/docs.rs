//! Documentation chunk rows in Redis.
//!
//! Chunks are keyed by entity name, so writing a chunk for an entity that
//! already has one replaces it. The chunk JSON lives in the `data` field and
//! the embedding id in its own `embedding_id` field, so recording an
//! embedding never rewrites the markdown.

use redis::AsyncCommands;

use lens_core::DocChunk;

use super::{CONNECTIONS_KEY, index_key, record_key};
use crate::client::{RedisPool, RedisResult};

const DOC: &str = "doc";
const DATA: &str = "data";
const EMBEDDING_ID: &str = "embedding_id";

/// JSON stored under `data`, without the embedding id.
fn encode_chunk(chunk: &DocChunk) -> RedisResult<String> {
    let mut row = chunk.clone();
    row.embedding_id = None;
    Ok(serde_json::to_string(&row)?)
}

/// Rebuild a chunk from its `data` and `embedding_id` fields.
fn decode_chunk(data: &str, embedding_id: Option<String>) -> RedisResult<DocChunk> {
    let mut chunk: DocChunk = serde_json::from_str(data)?;
    if embedding_id.is_some() {
        chunk.embedding_id = embedding_id;
    }
    Ok(chunk)
}

pub async fn list_doc_chunks(pool: &RedisPool, connection_id: &str) -> RedisResult<Vec<DocChunk>> {
    let mut conn = pool.clone();
    let mut names: Vec<String> = conn.smembers(index_key(connection_id, DOC)).await?;
    if names.is_empty() {
        return Ok(Vec::new());
    }
    names.sort();

    let mut pipe = redis::pipe();
    for name in &names {
        let key = record_key(connection_id, DOC, name);
        pipe.hget(&key, DATA).hget(&key, EMBEDDING_ID);
    }
    let rows: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

    let mut chunks = Vec::with_capacity(names.len());
    for pair in rows.chunks(2) {
        if let [Some(data), embedding_id] = pair {
            chunks.push(decode_chunk(data, embedding_id.clone())?);
        }
    }
    chunks.sort_by(|a, b| a.entity_name.cmp(&b.entity_name));
    Ok(chunks)
}

pub async fn get_doc_chunk(
    pool: &RedisPool,
    connection_id: &str,
    entity_name: &str,
) -> RedisResult<Option<DocChunk>> {
    let mut conn = pool.clone();
    let key = record_key(connection_id, DOC, entity_name);
    let (data, embedding_id): (Option<String>, Option<String>) = redis::pipe()
        .hget(&key, DATA)
        .hget(&key, EMBEDDING_ID)
        .query_async(&mut conn)
        .await?;
    match data {
        Some(d) => Ok(Some(decode_chunk(&d, embedding_id)?)),
        None => Ok(None),
    }
}

/// Write new markdown. The embedding id is replaced by the chunk's own,
/// or cleared, since the stored vector no longer matches the text.
pub async fn upsert_doc_chunk(pool: &RedisPool, chunk: &DocChunk) -> RedisResult<()> {
    let mut conn = pool.clone();
    let key = record_key(&chunk.connection_id, DOC, &chunk.entity_name);
    let mut pipe = redis::pipe();
    pipe.atomic().hset(&key, DATA, encode_chunk(chunk)?).ignore();
    match &chunk.embedding_id {
        Some(id) => pipe.hset(&key, EMBEDDING_ID, id).ignore(),
        None => pipe.hdel(&key, EMBEDDING_ID).ignore(),
    };
    pipe.sadd(index_key(&chunk.connection_id, DOC), &chunk.entity_name)
        .ignore()
        .sadd(CONNECTIONS_KEY, &chunk.connection_id)
        .ignore();
    let _: () = pipe.query_async(&mut conn).await?;
    Ok(())
}

/// Set `embedding_id` on an existing chunk with a single field write.
/// Returns `false` when no chunk exists for the entity.
pub async fn set_embedding_id(
    pool: &RedisPool,
    connection_id: &str,
    entity_name: &str,
    embedding_id: &str,
) -> RedisResult<bool> {
    let mut conn = pool.clone();
    let key = record_key(connection_id, DOC, entity_name);

    let exists: bool = conn.hexists(&key, DATA).await?;
    if !exists {
        return Ok(false);
    }
    conn.hset::<_, _, _, ()>(&key, EMBEDDING_ID, embedding_id).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_data_field_never_carries_embedding_id() {
        let mut chunk = DocChunk::new("c1", "orders", "# orders");
        chunk.embedding_id = Some("point-1".to_string());

        let data = encode_chunk(&chunk).unwrap();
        assert!(!data.contains("point-1"));

        let back = decode_chunk(&data, Some("point-1".to_string())).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_embedding_recorded_after_concurrent_upsert_keeps_new_markdown() {
        let mut hash: HashMap<&str, String> = HashMap::new();
        let old = DocChunk::new("c1", "orders", "# orders\nold text");
        hash.insert(DATA, encode_chunk(&old).unwrap());

        // An embedding run has read the old chunk; a new version lands
        // before it records its point id.
        let new = DocChunk::new("c1", "orders", "# orders\nnew text");
        hash.insert(DATA, encode_chunk(&new).unwrap());
        hash.insert(EMBEDDING_ID, "point-1".to_string());

        let stored = decode_chunk(&hash[DATA], hash.get(EMBEDDING_ID).cloned()).unwrap();
        assert_eq!(stored.markdown, "# orders\nnew text");
        assert_eq!(stored.embedding_id.as_deref(), Some("point-1"));
    }

    #[test]
    fn test_legacy_rows_keep_inline_embedding_id() {
        let mut chunk = DocChunk::new("c1", "orders", "# orders");
        chunk.embedding_id = Some("point-0".to_string());
        let legacy = serde_json::to_string(&chunk).unwrap();

        let back = decode_chunk(&legacy, None).unwrap();
        assert_eq!(back.embedding_id.as_deref(), Some("point-0"));
    }
}
