//! homelink shared types
//!
//! This crate provides the whitelist, intent, dispatch and controller
//! contract types shared by the gateway and the controller process.

pub mod codec;
pub mod compose;
pub mod gate;
pub mod intent;
pub mod registry;

use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::{ControllerReport, ErrorCategory, ExecutionFailure, ExecutionOutcome};
pub use compose::{compose, Composed, ReplyMeta, ReplyStatus, Resolution};
pub use gate::{DispatchDecision, DispatchGate, RejectReason};
pub use intent::{Action, IntentError, IntentResult};
pub use registry::{DeviceDefaults, DeviceRegistry, DeviceSpec, RegistryError};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Operating limits for the dispatch pipeline
pub mod limits {
    /// Minimum classifier confidence required to execute an action
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.65;

    /// Wall-clock budget for one controller invocation
    pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 10_000;

    /// Serial baud rate used when a device entry does not set one
    pub const DEFAULT_BAUD_RATE: u32 = 38_400;
}
