//! Resolve what to send, and where, from the device file and CLI overrides

use homelink_shared::{limits, DeviceDefaults};
use std::collections::BTreeMap;

/// Fully resolved serial write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialTarget {
    pub port: String,
    pub baudrate: u32,
    pub payload: String,
}

/// Command-line overrides for one invocation
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baudrate: Option<u32>,
    pub payload: Option<String>,
}

/// Work out port, baud rate and payload for `device`/`action`
///
/// Unknown devices are only accepted when both the port and the payload are
/// given explicitly.
pub fn resolve(
    defaults: &BTreeMap<String, DeviceDefaults>,
    device: &str,
    action: &str,
    overrides: &Overrides,
) -> Result<SerialTarget, String> {
    let cfg = defaults.get(device);

    if cfg.is_none() && (overrides.port.is_none() || overrides.payload.is_none()) {
        return Err(format!(
            "Unknown device '{}' and no overrides provided",
            device
        ));
    }

    let port = overrides
        .port
        .clone()
        .or_else(|| cfg.and_then(|c| c.port.clone()))
        .ok_or_else(|| format!("No serial port configured for '{}'", device))?;

    let baudrate = overrides
        .baudrate
        .or_else(|| cfg.and_then(|c| c.baudrate))
        .unwrap_or(limits::DEFAULT_BAUD_RATE);

    let payload = overrides
        .payload
        .clone()
        .or_else(|| cfg.and_then(|c| c.payloads.get(action).cloned()))
        .filter(|p| !p.is_empty())
        .ok_or_else(|| format!("No payload for action '{}' on '{}'", action, device))?;

    Ok(SerialTarget {
        port,
        baudrate,
        payload,
    })
}
