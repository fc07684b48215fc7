//! Response Composer
//!
//! Pure mapping from a decision, what happened after it, and the intent to
//! the user-facing reply, a metadata envelope and a status class. Callers
//! assert on `meta` and `status`; the reply prose is free to change.

use crate::codec::{ErrorCategory, ExecutionFailure, ExecutionOutcome};
use crate::gate::{DispatchDecision, RejectReason};
use crate::intent::{Action, IntentResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// What happened after the gate decided
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The controller ran
    Executed(ExecutionOutcome),
    /// Conversational fallback text
    Conversation(String),
    /// Nothing ran (rejected request)
    Refused,
}

/// Status class of a composed reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Rejected,
    Failed,
    TimedOut,
}

impl ReplyStatus {
    /// HTTP status code communicated to the caller
    pub fn http_code(self) -> u16 {
        match self {
            ReplyStatus::Ok => 200,
            ReplyStatus::Rejected => 403,
            ReplyStatus::Failed => 502,
            ReplyStatus::TimedOut => 504,
        }
    }

    pub fn is_success(self) -> bool {
        self == ReplyStatus::Ok
    }
}

/// Execution details mirrored into reply metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeMeta {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub failure: Option<ExecutionFailure>,
}

impl From<&ExecutionOutcome> for OutcomeMeta {
    fn from(outcome: &ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success { payload } => Self {
                ok: true,
                payload: Some(payload.clone()),
                failure: None,
            },
            ExecutionOutcome::Failure(f) => Self {
                ok: false,
                payload: None,
                failure: Some(f.clone()),
            },
        }
    }
}

/// Machine-readable envelope returned with every reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyMeta {
    #[serde(flatten)]
    pub intent: IntentResult,
    pub decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeMeta>,
    pub status: ReplyStatus,
}

/// Reply ready to send back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    pub reply: String,
    pub meta: ReplyMeta,
    pub status: ReplyStatus,
}

/// Merge a decision and its resolution into the user-facing reply
pub fn compose(
    decision: &DispatchDecision,
    resolution: &Resolution,
    intent: &IntentResult,
) -> Composed {
    let (reply, status) = match (decision, resolution) {
        (DispatchDecision::Reject(reason), _) => {
            let target = intent.device.as_deref().map(humanize).unwrap_or_default();
            (
                format!(
                    "Sorry, I can't {} {}: that isn't on the list of allowed actions ({}).",
                    intent.action.phrase(),
                    target,
                    reason
                ),
                ReplyStatus::Rejected,
            )
        }
        (DispatchDecision::Execute { device, action }, Resolution::Executed(outcome)) => {
            execution_reply(device, *action, outcome)
        }
        (_, Resolution::Conversation(text)) => {
            let text = text.trim();
            let reply = if text.is_empty() { "…" } else { text };
            (reply.to_string(), ReplyStatus::Ok)
        }
        _ => (
            "Sorry, something went wrong handling that request.".to_string(),
            ReplyStatus::Failed,
        ),
    };

    let reject_reason = match decision {
        DispatchDecision::Reject(reason) => Some(*reason),
        _ => None,
    };
    let outcome = match resolution {
        Resolution::Executed(outcome) => Some(OutcomeMeta::from(outcome)),
        _ => None,
    };

    Composed {
        reply,
        meta: ReplyMeta {
            intent: intent.clone(),
            decision: decision.label(),
            reject_reason,
            outcome,
            status,
        },
        status,
    }
}

fn execution_reply(device: &str, action: Action, outcome: &ExecutionOutcome) -> (String, ReplyStatus) {
    let name = humanize(device);
    let failure = match outcome {
        ExecutionOutcome::Success { .. } => {
            return (
                format!("✅ {} {}.", capitalize(action.past_tense()), name),
                ReplyStatus::Ok,
            );
        }
        ExecutionOutcome::Failure(f) => f,
    };

    let category = failure.category;
    match category {
        ErrorCategory::Disallowed => (
            format!(
                "Sorry, I'm not allowed to {} {} ({}).",
                action.phrase(),
                name,
                category
            ),
            ReplyStatus::Rejected,
        ),
        ErrorCategory::Timeout => (
            format!(
                "Sorry, {} did not respond in time, so I couldn't {} it ({}).",
                name,
                action.phrase(),
                category
            ),
            ReplyStatus::TimedOut,
        ),
        ErrorCategory::ControllerError => (
            format!(
                "Sorry, the controller couldn't {} {}: {} ({}).",
                action.phrase(),
                name,
                failure.message,
                category
            ),
            ReplyStatus::Failed,
        ),
        ErrorCategory::ExecError => (
            format!(
                "Sorry, I couldn't run the controller to {} {} ({}).",
                action.phrase(),
                name,
                category
            ),
            ReplyStatus::Failed,
        ),
    }
}

fn humanize(device: &str) -> String {
    device.replace('_', " ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
