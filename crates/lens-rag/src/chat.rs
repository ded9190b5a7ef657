//! Ollama chat client for answer generation.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use lens_core::config::OllamaSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Produces an answer from instructions, retrieved context and conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, system: &str, context: &str, history: &[ChatTurn], query: &str) -> Result<String>;
}

/// Non-streaming client for Ollama's /api/chat.
#[derive(Clone)]
pub struct OllamaChat {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatTurn,
}

impl OllamaChat {
    pub fn new(base_url: &str, model: &str, temperature: f32, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            client,
        }
    }

    pub fn from_settings(settings: &OllamaSettings, timeout: Duration) -> Self {
        Self::new(&settings.url, &settings.chat_model, settings.temperature, timeout)
    }
}

/// System instructions and context go in one system message, followed by
/// the conversation and the new question.
fn build_messages(system: &str, context: &str, history: &[ChatTurn], query: &str) -> Vec<ChatTurn> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatTurn {
        role: Role::System,
        content: format!("{system}\n\n{context}"),
    });
    messages.extend(history.iter().filter(|t| t.role != Role::System).cloned());
    messages.push(ChatTurn::user(query));
    messages
}

#[async_trait]
impl ChatModel for OllamaChat {
    async fn generate(&self, system: &str, context: &str, history: &[ChatTurn], query: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(system, context, history, query),
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to Ollama. Is it running?")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.contains("model") && body.contains("not found") {
                bail!("Model '{}' not found. Pull it with: ollama pull {}", self.model, self.model);
            }
            bail!("Ollama API error ({}): {}", status, body);
        }

        let result: ChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        debug!(model = %self.model, chars = result.message.content.len(), "Generated answer");
        Ok(result.message.content.trim().to_string())
    }
}
