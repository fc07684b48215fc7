//! Async chat-completion client
//!
//! Speaks the OpenAI-compatible format (Groq, OpenAI, local servers) and the
//! Anthropic messages format, picked from the endpoint URL.

use crate::config::LlmConfig;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// API format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

/// Chat-completion client shared by the classifier and the responder
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: Option<String>,
    api_url: String,
    api_format: ApiFormat,
}

impl LlmClient {
    /// Create a new client for the configured endpoint
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            api_format: detect_api_format(&config.api_url),
        })
    }

    /// Send one system + user exchange and return the model's text
    pub async fn complete(&self, model: &str, system: &str, user: &str) -> Result<String> {
        match self.api_format {
            ApiFormat::Anthropic => self.complete_anthropic(model, system, user).await,
            ApiFormat::OpenAI => self.complete_openai(model, system, user).await,
        }
    }

    async fn complete_anthropic(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: model.into(),
            max_tokens: 1024,
            system: system.into(),
            messages: vec![Message {
                role: "user".into(),
                content: user.into(),
            }],
        };

        let mut builder = self
            .client
            .post(&self.api_url)
            .header("anthropic-version", "2023-06-01")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder.send().await.context("LLM request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, error_text));
        }

        let completion: AnthropicResponse = response
            .json()
            .await
            .context("Failed to decode LLM response")?;

        completion
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| anyhow!("Empty LLM response"))
    }

    async fn complete_openai(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let request = OpenAIRequest {
            model: model.into(),
            max_tokens: 1024,
            messages: vec![
                Message {
                    role: "system".into(),
                    content: system.into(),
                },
                Message {
                    role: "user".into(),
                    content: user.into(),
                },
            ],
        };

        let mut builder = self.client.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.context("LLM request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, error_text));
        }

        let completion: OpenAIResponse = response
            .json()
            .await
            .context("Failed to decode LLM response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Empty LLM response"))
    }
}

fn detect_api_format(url: &str) -> ApiFormat {
    if url.contains("anthropic.com") {
        ApiFormat::Anthropic
    } else {
        ApiFormat::OpenAI
    }
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

// OpenAI-compatible API format
#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}
