//! Intent classification through a chat-completion model

use super::client::LlmClient;
use super::traits::IntentClassifier;
use anyhow::Result;
use async_trait::async_trait;
use homelink_shared::{DeviceRegistry, IntentResult};
use tracing::debug;

/// Classifier that prompts a language model with the device whitelist
pub struct LlmClassifier {
    client: LlmClient,
    model: String,
}

impl LlmClassifier {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, message: &str, whitelist: &DeviceRegistry) -> Result<IntentResult> {
        let system = system_prompt(whitelist);
        let user = format!("USER MESSAGE:\n{}\n\nClassify this message into JSON:", message);

        let response = self.client.complete(&self.model, &system, &user).await?;
        debug!("Classifier raw output: {}", response);

        Ok(IntentResult::from_model_output(&response))
    }

    fn name(&self) -> &'static str {
        "llm-classifier"
    }
}

/// Build the system prompt, listing only whitelisted devices and actions
pub fn system_prompt(whitelist: &DeviceRegistry) -> String {
    format!(
        r#"You are an intent classifier for a home control system.
Map the user's message onto exactly one device action from this list.

DEVICES AND PERMITTED ACTIONS:
{devices}

RULES:
- Only use device names and actions from the list above.
- If the message is not a request to control one of these devices, use "none".
- "confidence" is your certainty between 0.0 and 1.0.

OUTPUT FORMAT (JSON only, no explanation):
{{"intent": "<action or none>", "device": "<device name or null>", "confidence": 0.0-1.0, "reason": "<short rationale>"}}

Examples:
"switch the lights on" -> {{"intent": "turn_on", "device": "lights", "confidence": 0.95, "reason": "explicit request"}}
"what's the weather like?" -> {{"intent": "none", "device": null, "confidence": 0.9, "reason": "small talk"}}
"#,
        devices = whitelist.describe()
    )
}
