//! Device Registry
//!
//! Immutable whitelist of devices and the actions each accepts. Built once
//! from the device configuration file; there is no way to change it after
//! construction, so it can be shared across requests without locking.
//!
//! The configuration file is a JSON object keyed by device name:
//! ```text
//! { "lights": { "port": "/dev/ttyUSB0", "baudrate": 38400,
//!               "payloads": { "turn_on": "3101", "turn_off": "3100" } } }
//! ```
//! The keys of `payloads` form the device's permitted action set.

use crate::intent::Action;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

/// Errors building the registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read device configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed device configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Device configuration declares no devices")]
    Empty,

    #[error("Device '{0}' declares no actions")]
    NoActions(String),

    #[error("Device '{device}' declares unsupported action '{action}'")]
    InvalidAction { device: String, action: String },

    #[error("Device name must not be blank")]
    BlankName,
}

/// Serial parameters and payloads for one device, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefaults {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub baudrate: Option<u32>,
    pub payloads: BTreeMap<String, String>,
}

/// Parse the device configuration file contents
pub fn parse_defaults(json: &str) -> Result<BTreeMap<String, DeviceDefaults>, RegistryError> {
    Ok(serde_json::from_str(json)?)
}

/// A whitelisted device and its permitted actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSpec {
    pub name: String,
    pub actions: BTreeSet<Action>,
}

impl DeviceSpec {
    pub fn permits(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Read-only device whitelist
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceSpec>,
}

impl DeviceRegistry {
    /// Build from device specs, rejecting empty or inconsistent input
    pub fn new(specs: impl IntoIterator<Item = DeviceSpec>) -> Result<Self, RegistryError> {
        let mut devices = BTreeMap::new();
        for spec in specs {
            if spec.name.trim().is_empty() {
                return Err(RegistryError::BlankName);
            }
            if spec.actions.is_empty() {
                return Err(RegistryError::NoActions(spec.name));
            }
            if spec.actions.contains(&Action::None) {
                return Err(RegistryError::InvalidAction {
                    device: spec.name,
                    action: Action::None.to_string(),
                });
            }
            devices.insert(spec.name.clone(), spec);
        }

        if devices.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(Self { devices })
    }

    /// Build from parsed device configuration entries
    pub fn from_defaults(
        defaults: &BTreeMap<String, DeviceDefaults>,
    ) -> Result<Self, RegistryError> {
        let mut specs = Vec::with_capacity(defaults.len());
        for (name, cfg) in defaults {
            let mut actions = BTreeSet::new();
            for key in cfg.payloads.keys() {
                let action = key
                    .parse::<Action>()
                    .map_err(|_| RegistryError::InvalidAction {
                        device: name.clone(),
                        action: key.clone(),
                    })?;
                // `none` is the no-op intent, never an executable action
                if action.is_none() {
                    return Err(RegistryError::InvalidAction {
                        device: name.clone(),
                        action: key.clone(),
                    });
                }
                actions.insert(action);
            }
            specs.push(DeviceSpec {
                name: name.clone(),
                actions,
            });
        }
        Self::new(specs)
    }

    /// Build from the JSON text of a device configuration file
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        Self::from_defaults(&parse_defaults(json)?)
    }

    /// Load the device configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn lookup(&self, name: &str) -> Option<&DeviceSpec> {
        self.devices.get(name)
    }

    /// Check whether `device` exists and accepts `action`
    pub fn permits(&self, device: &str, action: Action) -> bool {
        self.lookup(device).is_some_and(|spec| spec.permits(action))
    }

    /// Iterate devices in name order
    pub fn devices(&self) -> impl Iterator<Item = &DeviceSpec> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// One line per device, for the classifier prompt
    pub fn describe(&self) -> String {
        self.devices
            .values()
            .map(|spec| {
                let actions: Vec<&str> = spec.actions.iter().map(|a| a.as_str()).collect();
                format!("- {}: {}", spec.name, actions.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
