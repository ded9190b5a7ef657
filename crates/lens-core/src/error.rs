//! Centralized error types for SchemaLens.

use thiserror::Error;

/// Main error type for sync, embedding and retrieval operations.
///
/// Variants that reach an operator carry the next step to take in their
/// message rather than only the underlying cause.
#[derive(Error, Debug)]
pub enum LensError {
    #[error("No metadata synced for connection '{0}'. Run the metadata sync first (schemalens ledger import).")]
    NoMetadataSynced(String),

    #[error("Connection isolation violated: run for '{expected}' reached data tagged '{found}'")]
    ConnectionIsolationViolation { expected: String, found: String },

    #[error("Graph store error: {0:#}")]
    GraphStore(#[source] anyhow::Error),

    #[error("Embedding provider error for '{entity}': {message}")]
    EmbeddingProvider { entity: String, message: String },

    #[error("Vector collection '{0}' is missing. Re-run the embedding sync: schemalens embed run <connection>")]
    CollectionMissing(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}. Recreate the collection and re-embed every connection.")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No relevant context found for connection '{0}'. Generate and embed documentation first (schemalens embed run).")]
    NoRelevantContext(String),

    #[error("LLM generation failed: {0}")]
    LlmGeneration(String),

    #[error("Vector store error: {0:#}")]
    VectorStore(#[source] anyhow::Error),

    #[error("Ledger error: {0:#}")]
    Ledger(#[source] anyhow::Error),

    #[error("{operation} timed out after {seconds}s; the request can be retried")]
    Timeout { operation: &'static str, seconds: u64 },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for SchemaLens operations.
pub type LensResult<T> = Result<T, LensError>;

impl LensError {
    /// Create a graph store error from any error type.
    pub fn graph(err: impl Into<anyhow::Error>) -> Self {
        Self::GraphStore(err.into())
    }

    /// Create a vector store error from any error type.
    pub fn vector(err: impl Into<anyhow::Error>) -> Self {
        Self::VectorStore(err.into())
    }

    /// Create a ledger error from any error type.
    pub fn ledger(err: impl Into<anyhow::Error>) -> Self {
        Self::Ledger(err.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether repeating the same call may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::EmbeddingProvider { .. }
                | Self::LlmGeneration(_)
                | Self::GraphStore(_)
                | Self::VectorStore(_)
        )
    }
}
