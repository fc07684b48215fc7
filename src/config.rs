//! Gateway configuration, read from the environment

use anyhow::{anyhow, Context, Result};
use homelink_shared::limits;
use std::path::PathBuf;
use std::time::Duration;

/// Default controller program name for this platform
#[cfg(windows)]
pub const DEFAULT_CONTROLLER: &str = "homelink-controller.exe";
#[cfg(not(windows))]
pub const DEFAULT_CONTROLLER: &str = "homelink-controller";

/// Language model endpoint and model names
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions URL
    pub api_url: String,
    pub api_key: Option<String>,
    /// Model used for intent classification
    pub classifier_model: String,
    /// Model used for conversational fallback
    pub chat_model: String,
    pub connect_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".into(),
            api_key: None,
            classifier_model: "llama3-8b-8192".into(),
            chat_model: "llama3-8b-8192".into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// External controller invocation
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Program to run
    pub program: String,
    /// Arguments placed before `--device`/`--action` (e.g. a script path)
    pub prefix_args: Vec<String>,
    /// Wall-clock budget per invocation
    pub timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_CONTROLLER.into(),
            prefix_args: Vec::new(),
            timeout: Duration::from_millis(limits::DEFAULT_EXEC_TIMEOUT_MS),
        }
    }
}

/// Configuration for the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HTTP listen address
    pub bind: String,
    /// Device configuration file (whitelist source)
    pub devices_path: PathBuf,
    /// Minimum confidence to execute an action
    pub confidence_threshold: f32,
    pub controller: ControllerConfig,
    pub llm: LlmConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".into(),
            devices_path: PathBuf::from("config/devices.json"),
            confidence_threshold: limits::DEFAULT_CONFIDENCE_THRESHOLD,
            controller: ControllerConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Build from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind) = get("HOMELINK_BIND") {
            config.bind = bind;
        }
        if let Some(path) = get("HOMELINK_DEVICES") {
            config.devices_path = PathBuf::from(path);
        }
        if let Some(raw) = get("HOMELINK_CONFIDENCE_THRESHOLD") {
            let threshold: f32 = raw
                .trim()
                .parse()
                .with_context(|| format!("HOMELINK_CONFIDENCE_THRESHOLD is not a number: {raw}"))?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(anyhow!(
                    "HOMELINK_CONFIDENCE_THRESHOLD must be within [0, 1], got {threshold}"
                ));
            }
            config.confidence_threshold = threshold;
        }

        if let Some(program) = get("HOMELINK_CONTROLLER") {
            config.controller.program = program;
        }
        if let Some(args) = get("HOMELINK_CONTROLLER_ARGS") {
            config.controller.prefix_args = args.split_whitespace().map(String::from).collect();
        }
        if let Some(raw) = get("HOMELINK_EXEC_TIMEOUT_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("HOMELINK_EXEC_TIMEOUT_MS is not an integer: {raw}"))?;
            if ms == 0 {
                return Err(anyhow!("HOMELINK_EXEC_TIMEOUT_MS must be positive"));
            }
            config.controller.timeout = Duration::from_millis(ms);
        }

        if let Some(url) = get("LLM_API_URL") {
            config.llm.api_url = url;
        }
        config.llm.api_key = get("LLM_API_KEY").or_else(|| get("GROQ_API_KEY"));
        if let Some(model) = get("CLASSIFIER_MODEL") {
            config.llm.classifier_model = model;
        }
        if let Some(model) = get("CHAT_MODEL") {
            config.llm.chat_model = model;
        }

        Ok(config)
    }
}
