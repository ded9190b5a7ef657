//! Runtime configuration.
//!
//! Values come from an optional TOML file, then environment variables
//! override individual settings. Every field has a default pointing at a
//! local development stack (Neo4j, Qdrant, Ollama, Redis).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{LensError, LensResult};

/// Default file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "schemalens.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub redis_url: String,
    pub graph: GraphSettings,
    pub qdrant: QdrantSettings,
    pub ollama: OllamaSettings,
    pub pipeline: PipelineSettings,
    pub retrieval: RetrievalSettings,
    pub timeouts: TimeoutSettings,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            graph: GraphSettings::default(),
            qdrant: QdrantSettings::default(),
            ollama: OllamaSettings::default(),
            pipeline: PipelineSettings::default(),
            retrieval: RetrievalSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
            database: "neo4j".to_string(),
            max_connections: 16,
        }
    }
}

/// Qdrant connection and collection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "schema_documentation".to_string(),
        }
    }
}

/// Ollama endpoints for embeddings and chat.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub url: String,
    pub embed_model: String,
    pub chat_model: String,
    /// Vector size produced by `embed_model`; fixed for the collection.
    pub dimension: usize,
    pub temperature: f32,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            embed_model: "mxbai-embed-large".to_string(),
            chat_model: "llama3.1".to_string(),
            dimension: 1024,
            temperature: 0.2,
        }
    }
}

/// Embedding worker pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl PipelineSettings {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: u64,
    pub history_turns: usize,
    pub max_context_chars: usize,
    pub hub_threshold: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            history_turns: 5,
            max_context_chars: 12_000,
            hub_threshold: 5,
        }
    }
}

/// Per-service deadlines, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub graph_secs: u64,
    pub vector_secs: u64,
    pub embed_secs: u64,
    pub llm_secs: u64,
    pub ledger_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            graph_secs: 30,
            vector_secs: 15,
            embed_secs: 30,
            llm_secs: 120,
            ledger_secs: 10,
        }
    }
}

impl TimeoutSettings {
    pub fn graph(&self) -> Duration {
        Duration::from_secs(self.graph_secs)
    }

    pub fn vector(&self) -> Duration {
        Duration::from_secs(self.vector_secs)
    }

    pub fn embed(&self) -> Duration {
        Duration::from_secs(self.embed_secs)
    }

    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_secs)
    }

    pub fn ledger(&self) -> Duration {
        Duration::from_secs(self.ledger_secs)
    }
}

impl LensConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> LensResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| LensError::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from `schemalens.toml` when present,
    /// else defaults; then apply environment overrides.
    pub fn load(path: Option<&Path>) -> LensResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> LensResult<Self> {
        debug!(path = %path.display(), "Loading configuration file");
        let text = std::fs::read_to_string(path)
            .map_err(|e| LensError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Override settings from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REDIS_URL") {
            self.redis_url = v;
        }
        if let Some(v) = lookup("NEO4J_URI") {
            self.graph.uri = v;
        }
        if let Some(v) = lookup("NEO4J_USER") {
            self.graph.user = v;
        }
        if let Some(v) = lookup("NEO4J_PASSWORD") {
            self.graph.password = v;
        }
        if let Some(v) = lookup("QDRANT_URL") {
            self.qdrant.url = v;
        }
        if let Some(v) = lookup("QDRANT_API_KEY") {
            self.qdrant.api_key = Some(v);
        }
        if let Some(v) = lookup("QDRANT_COLLECTION") {
            self.qdrant.collection = v;
        }
        if let Some(v) = lookup("OLLAMA_URL") {
            self.ollama.url = v;
        }
        if let Some(v) = lookup("OLLAMA_EMBED_MODEL") {
            self.ollama.embed_model = v;
        }
        if let Some(v) = lookup("OLLAMA_CHAT_MODEL") {
            self.ollama.chat_model = v;
        }
        if let Some(dim) = lookup("EMBEDDING_DIM").and_then(|v| v.parse().ok()) {
            self.ollama.dimension = dim;
        }
    }

    fn validate(&self) -> LensResult<()> {
        if self.ollama.dimension == 0 {
            return Err(LensError::config("ollama.dimension must be greater than zero"));
        }
        if self.pipeline.concurrency == 0 {
            return Err(LensError::config("pipeline.concurrency must be at least 1"));
        }
        if self.retrieval.top_k == 0 {
            return Err(LensError::config("retrieval.top_k must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_point_at_local_stack() {
        let config = LensConfig::default();
        assert_eq!(config.graph.uri, "bolt://localhost:7687");
        assert_eq!(config.qdrant.collection, "schema_documentation");
        assert_eq!(config.ollama.dimension, 1024);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.history_turns, 5);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = LensConfig::from_toml(
            r#"
            redis_url = "redis://cache:6379"

            [qdrant]
            collection = "docs_v2"

            [pipeline]
            concurrency = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.qdrant.collection, "docs_v2");
        assert_eq!(config.qdrant.url, "http://localhost:6334");
        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(config.pipeline.retry_attempts, 3);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NEO4J_URI", "bolt://graph:7687"),
            ("QDRANT_API_KEY", "secret"),
            ("EMBEDDING_DIM", "768"),
            ("OLLAMA_CHAT_MODEL", "qwen2.5"),
        ]);
        let mut config = LensConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.graph.uri, "bolt://graph:7687");
        assert_eq!(config.qdrant.api_key.as_deref(), Some("secret"));
        assert_eq!(config.ollama.dimension, 768);
        assert_eq!(config.ollama.chat_model, "qwen2.5");
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = LensConfig::from_toml("[pipeline]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, LensError::Config(_)));
    }
}
