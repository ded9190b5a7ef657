//! # SchemaLens RAG
//!
//! Answers questions about a connection's schema. Documentation found by
//! vector search is combined with the foreign keys the graph knows about,
//! and the model is instructed to answer from that context only.

pub mod chat;
pub mod context;
pub mod retriever;

pub use chat::{ChatModel, ChatTurn, OllamaChat, Role};
pub use context::{INSUFFICIENT_CONTEXT, SYSTEM_PROMPT};
pub use retriever::{Answer, HitSummary, HybridRetriever, RetrievalResult};
