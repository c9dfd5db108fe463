//! Chat-completion providers.
//!
//! The query service hands a [`ChatModel`] an ordered list of
//! human/assistant messages and gets one completion back. Backends:
//!
//! - **[`DisabledChatModel`]**: errors on every call.
//! - **[`OpenAIChatModel`]**: `POST {url}/chat/completions` (default `https://api.openai.com/v1`).
//! - **[`OllamaChatModel`]**: `POST {url}/api/chat` with `stream: false`.
//!
//! Calls are made once. A failure goes straight back to the caller, and
//! the HTTP layer turns it into a 500.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    /// Role name on the wire for OpenAI-style APIs.
    fn api_name(self) -> &'static str {
        match self {
            Role::Human => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
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

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Complete the conversation. `messages` is never empty.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

fn wire_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role.api_name(), "content": m.content }))
        .collect()
}

fn build_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn post_json(
    label: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{label} connection error"))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", label, status, body);
    }
    Ok(response.json().await?)
}

// ============ OpenAI ============

pub struct OpenAIChatModel {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    /// Requires `llm.model` and the `OPENAI_API_KEY` environment variable.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages(messages),
        });
        let json = post_json(
            "OpenAI",
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body),
        )
        .await?;
        parse_openai_completion(&json)
    }
}

fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaChatModel {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "stream": false,
        });
        let json = post_json("Ollama", self.client.post(&endpoint).json(&body))
            .await
            .map_err(|e| anyhow::anyhow!("{:#} (is Ollama running at {}?)", e, self.url))?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
    }
}

/// Create the [`ChatModel`] selected by `llm.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roles() {
        let msgs = vec![ChatMessage::human("hi"), ChatMessage::assistant("hello")];
        let wire = wire_messages(&msgs);
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[1]["role"], "assistant");
        assert_eq!(wire[1]["content"], "hello");
    }

    #[test]
    fn test_parse_openai_completion() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "May 3."}}]
        });
        assert_eq!(parse_openai_completion(&json).unwrap(), "May 3.");
        assert!(parse_openai_completion(&serde_json::json!({"choices": []})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_model_errors() {
        let model = create_chat_model(&LlmConfig::default()).unwrap();
        let err = model.complete(&[ChatMessage::human("x")]).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_unknown_provider() {
        let cfg = LlmConfig {
            provider: "magic".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_chat_model(&cfg).is_err());
    }
}
