//! homelink serial controller
//!
//! Invoked once per action by the gateway. Writes the device's payload to
//! its serial line and prints a single JSON report on stdout. Logs go to
//! stderr so stdout carries nothing but the report.

mod serial;
mod target;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use homelink_shared::registry::parse_defaults;
use homelink_shared::{ControllerReport, DeviceDefaults};
use serde_json::{json, Map, Value};
use serial::LineSettings;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;
use target::{resolve, Overrides, SerialTarget};
use tokio_serial::{DataBits, Parity, StopBits};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ParityArg {
    #[value(name = "N")]
    None,
    #[value(name = "E")]
    Even,
    #[value(name = "O")]
    Odd,
}

#[derive(Debug, Parser)]
#[command(name = "homelink-controller", version, about = "Send one device action over a serial line")]
struct Args {
    /// Device name as listed in the device file
    #[arg(long)]
    device: String,

    /// Action to perform
    #[arg(long)]
    action: String,

    /// Payload to send instead of the configured one
    #[arg(long)]
    payload: Option<String>,

    /// Serial port override
    #[arg(long)]
    port: Option<String>,

    /// Baud rate override
    #[arg(long)]
    baud: Option<u32>,

    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(5..=8))]
    data_bits: u8,

    #[arg(long, value_enum, default_value = "N")]
    parity: ParityArg,

    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    stop_bits: u8,

    /// Device file
    #[arg(long, env = "HOMELINK_DEVICES", default_value = "config/devices.json")]
    config: String,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port.clone(),
            baudrate: self.baud,
            payload: self.payload.clone(),
        }
    }

    fn line_settings(&self) -> LineSettings {
        LineSettings {
            data_bits: match self.data_bits {
                5 => DataBits::Five,
                6 => DataBits::Six,
                7 => DataBits::Seven,
                _ => DataBits::Eight,
            },
            parity: match self.parity {
                ParityArg::None => Parity::None,
                ParityArg::Even => Parity::Even,
                ParityArg::Odd => Parity::Odd,
            },
            stop_bits: if self.stop_bits == 2 {
                StopBits::Two
            } else {
                StopBits::One
            },
        }
    }
}

/// Load the device file; a missing file means no configured devices
fn load_defaults(path: &Path) -> Result<BTreeMap<String, DeviceDefaults>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_defaults(&contents).with_context(|| format!("Invalid device file {}", path.display()))
}

fn base_details(args: &Args) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("device".into(), json!(args.device));
    details.insert("action".into(), json!(args.action));
    details
}

fn target_details(args: &Args, target: &SerialTarget) -> Map<String, Value> {
    let mut details = base_details(args);
    details.insert("port".into(), json!(target.port));
    details.insert("baudrate".into(), json!(target.baudrate));
    details.insert("payload".into(), json!(target.payload));
    details
}

async fn run(args: &Args) -> ControllerReport {
    let defaults = match load_defaults(Path::new(&args.config)) {
        Ok(defaults) => defaults,
        Err(e) => return ControllerReport::failure(format!("{:#}", e), base_details(args)),
    };

    let target = match resolve(&defaults, &args.device, &args.action, &args.overrides()) {
        Ok(target) => target,
        Err(e) => return ControllerReport::failure(e, base_details(args)),
    };

    let details = target_details(args, &target);
    match serial::transmit(&target, args.line_settings()).await {
        Ok(()) => {
            info!(
                "Sent {} to {} for {} {}",
                target.payload, target.port, args.action, args.device
            );
            ControllerReport::success(details)
        }
        Err(e) => ControllerReport::failure(format!("{:#}", e), details),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let report = run(&args).await;
    if let Some(err) = &report.error {
        error!("{} {} failed: {}", args.action, args.device, err);
    }

    println!("{}", report.encode());
    if report.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
