//! Command execution for whitelisted device actions
//!
//! This module handles:
//! - Re-validating the device/action pair against the whitelist
//! - Running the controller process under a hard timeout
//! - Normalizing controller output into an execution outcome

mod executor;

pub use executor::ActionExecutor;
