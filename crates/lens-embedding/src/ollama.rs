//! Ollama HTTP client for embedding generation.
//!
//! Uses the Ollama API at /api/embed. The default model,
//! mxbai-embed-large, produces 1024-dimensional vectors.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use lens_core::config::OllamaSettings;

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model name, for logs and reports.
    fn model(&self) -> &str;
}

/// Ollama embedding client.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    /// Create a new Ollama client with specified URL, model and request timeout.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    pub fn from_settings(settings: &OllamaSettings, timeout: Duration) -> Self {
        Self::new(&settings.url, &settings.embed_model, timeout)
    }

    /// Check if the Ollama service is healthy and the model is available.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let text = resp.text().await.unwrap_or_default();
                Ok(text.contains(&self.model))
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self.client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let result: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        let embedding = result
            .embeddings
            .into_iter()
            .next()
            .context("Ollama returned no embedding")?;

        debug!(dim = embedding.len(), model = %self.model, "Generated embedding");
        Ok(embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
