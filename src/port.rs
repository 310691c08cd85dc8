use anyhow::{Context, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;
use tracing::debug;

use crate::cli::SerialOpts;

/// Opens the modem for API-mode traffic: 8 data bits, no parity, two stop
/// bits. Bytes left over from a previous session are discarded.
pub fn open_port(opts: &SerialOpts) -> Result<Box<dyn SerialPort>> {
    let flow = if opts.rtscts {
        FlowControl::Hardware
    } else {
        FlowControl::None
    };
    let port = serialport::new(&opts.dev, opts.baud)
        .timeout(Duration::from_millis(opts.read_timeout_ms))
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::Two)
        .flow_control(flow)
        .open()
        .with_context(|| format!("open {}", opts.dev))?;

    port.clear(ClearBuffer::Input)
        .with_context(|| format!("flush {}", opts.dev))?;
    debug!(dev = %opts.dev, baud = opts.baud, ?flow, "port open");
    Ok(port)
}
