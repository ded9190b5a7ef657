//! Read-side Cypher queries. Every query binds `$connectionId`.

pub mod relations;
pub mod structure;
