mod command;
mod config;
mod http;
mod llm;
mod pipeline;

use anyhow::Context;
use command::ActionExecutor;
use config::GatewayConfig;
use homelink_shared::{DeviceRegistry, DispatchGate};
use llm::{LlmClassifier, LlmClient, LlmResponder};
use pipeline::Pipeline;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = GatewayConfig::from_env().context("Invalid configuration")?;

    info!("homelink gateway starting");
    info!("  Devices: {}", config.devices_path.display());
    info!("  Confidence threshold: {}", config.confidence_threshold);
    info!(
        "  Controller: {} {:?} (timeout {}ms)",
        config.controller.program,
        config.controller.prefix_args,
        config.controller.timeout.as_millis()
    );

    // The whitelist is fixed for the life of the process
    let registry = Arc::new(
        DeviceRegistry::load(&config.devices_path).context("Failed to load device whitelist")?,
    );
    for device in registry.devices() {
        let actions: Vec<&str> = device.actions.iter().map(|a| a.as_str()).collect();
        info!("  Device {}: {}", device.name, actions.join(", "));
    }

    if config.llm.api_key.is_none() {
        warn!("No LLM_API_KEY/GROQ_API_KEY set, model requests are sent unauthenticated");
    }
    let client = LlmClient::new(&config.llm)?;
    info!(
        "  Models: classifier={} chat={}",
        config.llm.classifier_model, config.llm.chat_model
    );

    let pipeline = Pipeline::new(
        Arc::new(LlmClassifier::new(
            client.clone(),
            config.llm.classifier_model.clone(),
        )),
        Arc::new(LlmResponder::new(client, config.llm.chat_model.clone())),
        DispatchGate::new(registry.clone(), config.confidence_threshold),
        ActionExecutor::new(registry, &config.controller),
    );

    http::run(http::AppState::new(pipeline), &config.bind).await
}
