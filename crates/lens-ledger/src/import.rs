//! Operator-provided metadata snapshots.
//!
//! An import file describes tables, columns and foreign keys by name:
//!
//! ```json
//! {
//!   "connection_id": "olist",
//!   "entities": [
//!     { "name": "customers", "fields": [{ "name": "id", "type": "uuid", "primary_key": true }] },
//!     { "name": "orders", "fields": [{ "name": "customer_id", "type": "uuid" }] }
//!   ],
//!   "foreign_keys": [{ "from": "orders.customer_id", "to": "customers.id" }],
//!   "docs": { "orders": "# orders\nOne row per purchase." }
//! }
//! ```
//!
//! Ids are derived from names, so importing the same file twice yields the
//! same records. Dots and `%` inside a table or column name are escaped in
//! field ids, so `a.b` + `c` and `a` + `b.c` never share an id. A foreign key
//! endpoint like `a.b.c` is matched against the declared columns and is
//! rejected when more than one split fits.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::warn;

use lens_core::{DocChunk, Entity, Field, LedgerSnapshot, LensError, LensResult, Relationship};

#[derive(Debug, Clone, Deserialize)]
pub struct ImportFile {
    pub connection_id: String,
    #[serde(default)]
    pub entities: Vec<ImportEntity>,
    #[serde(default)]
    pub foreign_keys: Vec<ImportForeignKey>,
    #[serde(default)]
    pub docs: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportEntity {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<ImportField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportField {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_type() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

/// `table.column` on both sides.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportForeignKey {
    pub from: String,
    pub to: String,
}

/// What survived validation.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub entities: usize,
    pub fields: usize,
    pub relationships: usize,
    pub docs: usize,
    /// Relationships dropped because an endpoint does not exist.
    pub rejected_relationships: Vec<String>,
}

impl ImportFile {
    pub fn from_json(text: &str) -> LensResult<Self> {
        serde_json::from_str(text).map_err(LensError::ledger)
    }

    /// Convert to ledger records, keyed by deterministic ids.
    pub fn into_records(self) -> (LedgerSnapshot, Vec<DocChunk>) {
        let conn = self.connection_id;
        let mut snapshot = LedgerSnapshot::new(&conn);

        for entity in &self.entities {
            let entity_id = format!("{}:{}", conn, entity.name);
            snapshot.entities.push(Entity {
                id: entity_id.clone(),
                connection_id: conn.clone(),
                name: entity.name.clone(),
            });
            for field in &entity.fields {
                snapshot.fields.push(Field {
                    id: field_id(&conn, &entity.name, &field.name),
                    entity_id: entity_id.clone(),
                    name: field.name.clone(),
                    data_type: field.data_type.clone(),
                    is_nullable: field.nullable,
                    is_primary_key: field.primary_key,
                });
            }
        }

        let columns: HashSet<(&str, &str)> = self
            .entities
            .iter()
            .flat_map(|e| e.fields.iter().map(move |f| (e.name.as_str(), f.name.as_str())))
            .collect();
        for fk in &self.foreign_keys {
            snapshot.relationships.push(Relationship {
                id: format!("{}:{}->{}", conn, fk.from, fk.to),
                source_field_id: endpoint_field_id(&conn, &fk.from, &columns),
                target_field_id: endpoint_field_id(&conn, &fk.to, &columns),
            });
        }

        let mut docs: Vec<DocChunk> = self
            .docs
            .iter()
            .map(|(entity, markdown)| DocChunk::new(&conn, entity, markdown))
            .collect();
        docs.sort_by(|a, b| a.entity_name.cmp(&b.entity_name));

        (snapshot, docs)
    }
}

fn escape(part: &str) -> String {
    part.replace('%', "%25").replace('.', "%2E")
}

fn field_id(conn: &str, table: &str, column: &str) -> String {
    format!("{}:{}.{}", conn, escape(table), escape(column))
}

/// Field id for a `table.column` endpoint.
///
/// Unmatched or ambiguous endpoints get an id with no unescaped dot, which
/// no field carries, so validation rejects the relationship.
fn endpoint_field_id(conn: &str, qualified: &str, columns: &HashSet<(&str, &str)>) -> String {
    let matches: Vec<(&str, &str)> = qualified
        .match_indices('.')
        .map(|(i, _)| (&qualified[..i], &qualified[i + 1..]))
        .filter(|split| columns.contains(split))
        .collect();
    match matches.as_slice() {
        [(table, column)] => field_id(conn, table, column),
        [] => format!("{}:{}", conn, escape(qualified)),
        _ => {
            warn!(connection_id = conn, endpoint = qualified, "Ambiguous foreign key endpoint");
            format!("{}:{}", conn, escape(qualified))
        }
    }
}

/// Check a snapshot before it is written to the ledger.
///
/// Entities tagged with another connection, duplicate entity names,
/// duplicate field names and duplicate field ids are rejected. Relationships whose endpoints do not
/// resolve to fields of this snapshot are dropped and listed in the report.
pub fn validate_snapshot(mut snapshot: LedgerSnapshot) -> LensResult<(LedgerSnapshot, ImportReport)> {
    let conn = snapshot.connection_id.clone();

    let mut names = HashSet::new();
    for entity in &snapshot.entities {
        if entity.connection_id != conn {
            return Err(LensError::ConnectionIsolationViolation {
                expected: conn,
                found: entity.connection_id.clone(),
            });
        }
        if !names.insert(entity.name.as_str()) {
            return Err(LensError::ledger(anyhow::anyhow!(
                "duplicate entity '{}' in connection '{}'",
                entity.name,
                conn
            )));
        }
    }

    let entity_ids: HashSet<&str> = snapshot.entities.iter().map(|e| e.id.as_str()).collect();
    let mut field_names = HashSet::new();
    for field in &snapshot.fields {
        if !entity_ids.contains(field.entity_id.as_str()) {
            return Err(LensError::ledger(anyhow::anyhow!(
                "field '{}' belongs to unknown entity '{}'",
                field.name,
                field.entity_id
            )));
        }
        if !field_names.insert((field.entity_id.as_str(), field.name.as_str())) {
            return Err(LensError::ledger(anyhow::anyhow!(
                "duplicate field '{}' on entity '{}'",
                field.name,
                field.entity_id
            )));
        }
    }

    let mut field_ids: HashSet<String> = HashSet::new();
    for field in &snapshot.fields {
        if !field_ids.insert(field.id.clone()) {
            return Err(LensError::ledger(anyhow::anyhow!(
                "duplicate field id '{}' in connection '{}'",
                field.id,
                conn
            )));
        }
    }

    let mut rejected = Vec::new();
    snapshot.relationships.retain(|rel| {
        let ok = field_ids.contains(&rel.source_field_id) && field_ids.contains(&rel.target_field_id);
        if !ok {
            warn!(
                connection_id = %conn,
                relationship = %rel.id,
                "Dropping relationship with unresolved endpoint"
            );
            rejected.push(rel.id.clone());
        }
        ok
    });

    let report = ImportReport {
        entities: snapshot.entities.len(),
        fields: snapshot.fields.len(),
        relationships: snapshot.relationships.len(),
        docs: 0,
        rejected_relationships: rejected,
    };
    Ok((snapshot, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "connection_id": "shop",
        "entities": [
            { "name": "customers", "fields": [{ "name": "id", "type": "uuid", "primary_key": true, "nullable": false }] },
            { "name": "orders", "fields": [
                { "name": "id", "type": "uuid", "primary_key": true },
                { "name": "customer_id", "type": "uuid" }
            ] }
        ],
        "foreign_keys": [
            { "from": "orders.customer_id", "to": "customers.id" },
            { "from": "orders.customer_id", "to": "accounts.id" }
        ],
        "docs": { "orders": "One row per purchase." }
    }"#;

    #[test]
    fn test_import_file_builds_records_with_stable_ids() {
        let (snapshot, docs) = ImportFile::from_json(SAMPLE).unwrap().into_records();
        assert_eq!(snapshot.entities.len(), 2);
        assert_eq!(snapshot.fields.len(), 3);
        assert_eq!(snapshot.relationships.len(), 2);
        assert_eq!(snapshot.fields[0].id, "shop:customers.id");
        assert!(!snapshot.fields[0].is_nullable);
        assert_eq!(snapshot.relationships[0].source_field_id, "shop:orders.customer_id");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].entity_name, "orders");

        let (again, _) = ImportFile::from_json(SAMPLE).unwrap().into_records();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn test_unresolved_relationship_is_not_persisted() {
        let (snapshot, _) = ImportFile::from_json(SAMPLE).unwrap().into_records();
        let (clean, report) = validate_snapshot(snapshot).unwrap();
        assert_eq!(clean.relationships.len(), 1);
        assert_eq!(report.relationships, 1);
        assert_eq!(report.rejected_relationships, vec!["shop:orders.customer_id->accounts.id"]);
    }

    #[test]
    fn test_foreign_connection_entity_is_rejected() {
        let mut snapshot = LedgerSnapshot::new("a");
        snapshot.entities.push(Entity {
            id: "e1".into(),
            connection_id: "b".into(),
            name: "users".into(),
        });
        let err = validate_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, LensError::ConnectionIsolationViolation { .. }));
    }

    #[test]
    fn test_duplicate_entity_name_is_rejected() {
        let mut snapshot = LedgerSnapshot::new("a");
        for id in ["e1", "e2"] {
            snapshot.entities.push(Entity {
                id: id.into(),
                connection_id: "a".into(),
                name: "users".into(),
            });
        }
        assert!(matches!(validate_snapshot(snapshot), Err(LensError::Ledger(_))));
    }

    const DOTTED: &str = r#"{
        "connection_id": "dw",
        "entities": [
            { "name": "a.b", "fields": [{ "name": "c" }] },
            { "name": "a", "fields": [{ "name": "b.c" }, { "name": "id" }] },
            { "name": "sales.orders", "fields": [{ "name": "customer_id" }] }
        ],
        "foreign_keys": [
            { "from": "sales.orders.customer_id", "to": "a.id" },
            { "from": "a.b.c", "to": "a.id" }
        ]
    }"#;

    #[test]
    fn test_dotted_names_get_distinct_field_ids() {
        let (snapshot, _) = ImportFile::from_json(DOTTED).unwrap().into_records();
        let ab_c = &snapshot.fields[0].id;
        let a_bc = &snapshot.fields[1].id;
        assert_eq!(ab_c, "dw:a%2Eb.c");
        assert_eq!(a_bc, "dw:a.b%2Ec");
        assert_ne!(ab_c, a_bc);

        let (clean, report) = validate_snapshot(snapshot).unwrap();
        assert_eq!(clean.fields.len(), 4);
        assert_eq!(report.fields, 4);
    }

    #[test]
    fn test_dotted_table_foreign_key_resolves_and_ambiguous_one_is_dropped() {
        let (snapshot, _) = ImportFile::from_json(DOTTED).unwrap().into_records();
        assert_eq!(snapshot.relationships[0].source_field_id, "dw:sales%2Eorders.customer_id");

        let (clean, report) = validate_snapshot(snapshot).unwrap();
        assert_eq!(clean.relationships.len(), 1);
        assert_eq!(clean.relationships[0].target_field_id, "dw:a.id");
        assert_eq!(report.rejected_relationships, vec!["dw:a.b.c->a.id"]);
    }

    #[test]
    fn test_duplicate_field_id_is_rejected() {
        let mut snapshot = LedgerSnapshot::new("a");
        for (id, name) in [("e1", "users"), ("e2", "accounts")] {
            snapshot.entities.push(Entity {
                id: id.into(),
                connection_id: "a".into(),
                name: name.into(),
            });
            snapshot.fields.push(Field {
                id: "a:shared".into(),
                entity_id: id.into(),
                name: "id".into(),
                data_type: "uuid".into(),
                is_nullable: false,
                is_primary_key: true,
            });
        }
        let err = validate_snapshot(snapshot).unwrap_err();
        assert!(err.to_string().contains("duplicate field id"));
    }
}
