//! Conversational fallback through a chat-completion model

use super::client::LlmClient;
use super::traits::Conversationalist;
use anyhow::Result;
use async_trait::async_trait;

const SYSTEM_PROMPT: &str = "You are a short-response, helpful home assistant.";

/// Free-text responder for requests that are not executed
pub struct LlmResponder {
    client: LlmClient,
    model: String,
}

impl LlmResponder {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Conversationalist for LlmResponder {
    async fn respond(&self, message: &str) -> Result<String> {
        self.client.complete(&self.model, SYSTEM_PROMPT, message).await
    }

    fn name(&self) -> &'static str {
        "llm-responder"
    }
}
