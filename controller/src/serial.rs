//! Serial-line transmitter

use crate::target::SerialTarget;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tracing::debug;

/// Line settings beyond the baud rate
#[derive(Debug, Clone, Copy)]
pub struct LineSettings {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Write the payload as ASCII to the target port and flush
pub async fn transmit(target: &SerialTarget, line: LineSettings) -> Result<()> {
    debug!(
        "Opening {} at {} baud ({:?} {:?} {:?})",
        target.port, target.baudrate, line.data_bits, line.parity, line.stop_bits
    );

    let mut port = tokio_serial::new(&target.port, target.baudrate)
        .data_bits(line.data_bits)
        .parity(line.parity)
        .stop_bits(line.stop_bits)
        .timeout(Duration::from_secs(1))
        .open_native_async()
        .with_context(|| format!("Failed to open serial port {}", target.port))?;

    port.write_all(target.payload.as_bytes())
        .await
        .with_context(|| format!("Failed to write to {}", target.port))?;
    port.flush()
        .await
        .with_context(|| format!("Failed to flush {}", target.port))?;

    debug!("Wrote {} bytes to {}", target.payload.len(), target.port);
    Ok(())
}
