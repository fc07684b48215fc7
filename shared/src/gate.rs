//! Dispatch Gate
//!
//! Converts a classified intent into exactly one dispatch decision.
//! Order of checks:
//! 1. `none` intent → Fallback
//! 2. no target device → Fallback
//! 3. device/action not whitelisted → Reject(DISALLOWED), at any confidence
//! 4. confidence below threshold → Fallback
//! 5. otherwise → Execute
//!
//! A whitelist miss is reported back to the caller; a low-confidence guess
//! is treated as unclassified and answered conversationally.

use crate::intent::{Action, IntentResult};
use crate::limits;
use crate::registry::DeviceRegistry;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Device unknown or action not permitted for it
    Disallowed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Disallowed => f.write_str("DISALLOWED"),
        }
    }
}

/// Result of gating one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Run the action on the device
    Execute { device: String, action: Action },
    /// Answer conversationally
    Fallback,
    /// Refuse and report to the caller
    Reject(RejectReason),
}

impl DispatchDecision {
    /// Short label used in reply metadata and logs
    pub fn label(&self) -> &'static str {
        match self {
            DispatchDecision::Execute { .. } => "execute",
            DispatchDecision::Fallback => "fallback",
            DispatchDecision::Reject(_) => "reject",
        }
    }
}

/// Decides whether a classified intent may run
#[derive(Debug, Clone)]
pub struct DispatchGate {
    registry: Arc<DeviceRegistry>,
    threshold: f32,
}

impl DispatchGate {
    /// Create a gate; `threshold` is clamped into [0, 1]
    pub fn new(registry: Arc<DeviceRegistry>, threshold: f32) -> Self {
        let threshold = if threshold.is_nan() {
            limits::DEFAULT_CONFIDENCE_THRESHOLD
        } else {
            threshold.clamp(0.0, 1.0)
        };
        Self {
            registry,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Decide what to do with an intent
    pub fn decide(&self, intent: &IntentResult) -> DispatchDecision {
        if intent.action.is_none() {
            return DispatchDecision::Fallback;
        }

        let device = match intent.device.as_deref() {
            Some(d) => d,
            None => return DispatchDecision::Fallback,
        };

        if !self.registry.permits(device, intent.action) {
            return DispatchDecision::Reject(RejectReason::Disallowed);
        }

        // Equal to the threshold passes
        if intent.confidence < self.threshold {
            return DispatchDecision::Fallback;
        }

        DispatchDecision::Execute {
            device: device.to_string(),
            action: intent.action,
        }
    }
}
