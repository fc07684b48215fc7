//! Intent types and the classifier output contract
//!
//! The classifier is asked for a single JSON object:
//! ```text
//! { "intent": "turn_on" | ... | "none", "device": string | null,
//!   "confidence": 0.0-1.0, "reason": string }
//! ```
//! Anything that does not honour that contract decodes to an error, and
//! [`IntentResult::from_model_output`] turns every such error into the
//! "none" intent so a bad model reply can never abort a request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Actions a device can be asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TurnOn,
    TurnOff,
    Start,
    Stop,
    Status,
    /// No actionable intent
    None,
}

impl Action {
    /// Every action a device may declare (excludes `None`)
    pub const EXECUTABLE: [Action; 5] = [
        Action::TurnOn,
        Action::TurnOff,
        Action::Start,
        Action::Stop,
        Action::Status,
    ];

    /// Wire name, as used on the controller command line
    pub fn as_str(self) -> &'static str {
        match self {
            Action::TurnOn => "turn_on",
            Action::TurnOff => "turn_off",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Status => "status",
            Action::None => "none",
        }
    }

    /// Past-tense phrase for user-facing replies
    pub fn past_tense(self) -> &'static str {
        match self {
            Action::TurnOn => "turned on",
            Action::TurnOff => "turned off",
            Action::Start => "started",
            Action::Stop => "stopped",
            Action::Status => "checked",
            Action::None => "left alone",
        }
    }

    /// Infinitive phrase for user-facing replies
    pub fn phrase(self) -> &'static str {
        match self {
            Action::TurnOn => "turn on",
            Action::TurnOff => "turn off",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Status => "check",
            Action::None => "do nothing with",
        }
    }

    pub fn is_none(self) -> bool {
        self == Action::None
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turn_on" | "on" => Ok(Action::TurnOn),
            "turn_off" | "off" => Ok(Action::TurnOff),
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            "status" | "check" => Ok(Action::Status),
            "none" | "" => Ok(Action::None),
            other => Err(IntentError::UnknownAction(other.to_string())),
        }
    }
}

/// Errors decoding classifier output
#[derive(Error, Debug)]
pub enum IntentError {
    #[error("No JSON object found in classifier output")]
    NoJson,

    #[error("Malformed classifier output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Classifier output has no intent field")]
    MissingIntent,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Confidence out of range: {0}")]
    ConfidenceOutOfRange(f64),
}

/// Structured guess produced by the classifier for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentResult {
    #[serde(rename = "intent")]
    pub action: Action,
    pub device: Option<String>,
    pub confidence: f32,
    pub reason: String,
}

impl Default for IntentResult {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Deserialize)]
struct RawIntent {
    intent: Option<String>,
    #[serde(default, alias = "deviceId")]
    device: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

impl IntentResult {
    /// The "no actionable intent" result
    pub fn none() -> Self {
        Self {
            action: Action::None,
            device: None,
            confidence: 0.0,
            reason: String::new(),
        }
    }

    /// Decode classifier output, tolerating prose around the JSON object
    pub fn decode(raw: &str) -> Result<Self, IntentError> {
        let json = extract_json(raw)?;
        let parsed: RawIntent = serde_json::from_str(json)?;

        let action: Action = parsed.intent.ok_or(IntentError::MissingIntent)?.parse()?;

        let confidence = parsed.confidence.unwrap_or(0.0);
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(IntentError::ConfidenceOutOfRange(confidence));
        }

        let device = parsed
            .device
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty() && d != "null");

        Ok(Self {
            action,
            device,
            confidence: confidence as f32,
            reason: parsed.reason.unwrap_or_default(),
        })
    }

    /// Decode classifier output, degrading any contract violation to `none`
    pub fn from_model_output(raw: &str) -> Self {
        Self::decode(raw).unwrap_or_else(|_| Self::none())
    }
}

/// Extract the outermost JSON object from model output
fn extract_json(response: &str) -> Result<&str, IntentError> {
    let start = response.find('{').ok_or(IntentError::NoJson)?;
    let end = response.rfind('}').ok_or(IntentError::NoJson)?;
    if end < start {
        return Err(IntentError::NoJson);
    }
    Ok(&response[start..=end])
}
