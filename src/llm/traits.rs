//! Trait seams for the language-model capabilities the pipeline consumes

use anyhow::Result;
use async_trait::async_trait;
use homelink_shared::{DeviceRegistry, IntentResult};

/// Turns free text into a structured intent guess
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify `message`, restricted to the devices in `whitelist`
    ///
    /// Malformed model output must come back as the `none` intent, not an
    /// error; `Err` is reserved for transport failures.
    async fn classify(&self, message: &str, whitelist: &DeviceRegistry) -> Result<IntentResult>;

    /// Human-readable name for logs
    fn name(&self) -> &'static str;
}

/// Produces a conversational answer for requests that are not executed
#[async_trait]
pub trait Conversationalist: Send + Sync {
    async fn respond(&self, message: &str) -> Result<String>;

    /// Human-readable name for logs
    fn name(&self) -> &'static str;
}
