//! # SchemaLens Embedding
//!
//! Vector embeddings via Ollama and documentation storage in Qdrant.
//!
//! One point per (connection, entity), keyed by a name-derived UUID, with
//! the connection id in its payload so that every search can be scoped.

pub mod collection;
pub mod memory;
pub mod ollama;
pub mod pipeline;
pub mod qdrant;
pub mod store;

pub use collection::{CollectionAdmin, CollectionInfo};
pub use memory::MemoryVectorStore;
pub use ollama::{Embedder, OllamaClient};
pub use pipeline::{EmbedFailure, EmbedReport, EmbeddingPipeline, EmbeddingStatus, embedding_status};
pub use qdrant::QdrantStore;
pub use store::{DocPoint, SearchHit, VectorError, VectorResult, VectorStore, point_id};
