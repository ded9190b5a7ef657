//! # SchemaLens Core
//!
//! Shared data model, error taxonomy and configuration for the
//! schema graph and retrieval crates.

pub mod config;
pub mod deadline;
pub mod error;
pub mod locks;
pub mod model;

pub use config::LensConfig;
pub use deadline::with_deadline;
pub use error::{LensError, LensResult};
pub use locks::{ConnectionGuard, ConnectionLocks};
pub use model::{DocChunk, Entity, Field, LedgerSnapshot, Relationship};
