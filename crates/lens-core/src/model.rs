//! Relational metadata as read from the ledger.
//!
//! These records are the source of truth; graph nodes and vector points are
//! derived from them and can always be rebuilt.

use serde::{Deserialize, Serialize};

/// A table discovered under a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub connection_id: String,
    pub name: String,
}

/// A column owned by exactly one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub entity_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

/// A foreign key from one field to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_field_id: String,
    pub target_field_id: String,
}

/// Generated markdown documentation for one entity.
///
/// Keyed by `(connection_id, entity_name)`; the ledger keeps at most one
/// current chunk per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocChunk {
    pub connection_id: String,
    pub entity_name: String,
    pub markdown: String,
    #[serde(default)]
    pub embedding_id: Option<String>,
    #[serde(default)]
    pub updated_at: String,
}

impl DocChunk {
    pub fn new(connection_id: &str, entity_name: &str, markdown: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            entity_name: entity_name.to_string(),
            markdown: markdown.to_string(),
            embedding_id: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Text sent to the embedding provider and stored as the point content.
    pub fn embedding_text(&self) -> String {
        format!("Table: {}\n\n{}", self.entity_name, self.markdown)
    }
}

/// Everything the ledger holds for one connection at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub connection_id: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl LedgerSnapshot {
    pub fn new(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_deserializes_with_defaults() {
        let json = r#"{"id":"f1","entity_id":"e1","name":"email","type":"text"}"#;
        let field: Field = serde_json::from_str(json).unwrap();
        assert_eq!(field.data_type, "text");
        assert!(field.is_nullable);
        assert!(!field.is_primary_key);
    }

    #[test]
    fn test_embedding_text_prefixes_table_name() {
        let chunk = DocChunk::new("c1", "orders", "# Orders\nOne row per order.");
        assert_eq!(chunk.embedding_text(), "Table: orders\n\n# Orders\nOne row per order.");
        assert!(chunk.embedding_id.is_none());
    }
}
