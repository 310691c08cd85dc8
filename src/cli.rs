use anyhow::bail;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::time::Duration;

use xbee_link::PollPolicy;
use xbee_link::config::parse_address;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "xbee-link",
    about = "Robot radio link over an API-mode modem: round-robin commands, acks and telemetry"
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Drive the configured robots and report link health
    Run(RunOpts),
    /// Decode and print every frame from the modem without transmitting
    Sniff(SniffOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub rtscts: bool,
    /// Read timeout in milliseconds (1..=50). Timers run between reads, so a
    /// transaction can hold the channel this much past its deadline.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=50))]
    pub read_timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// 64-bit robot address in hex; repeat in scheduling order
    #[arg(long = "robot", value_parser = parse_address, required = true)]
    pub robots: Vec<u64>,
    /// Telemetry poll policy: converging or rotating
    #[arg(long, default_value_t = PollPolicy::Converging)]
    pub poll: PollPolicy,
    /// Send the RUN flag (robots stay disabled otherwise)
    #[arg(long, default_value_t = false)]
    pub enable: bool,
    /// Dribbler power held on every robot (0.0..1.0)
    #[arg(long, default_value_t = 0.0)]
    pub dribble: f64,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 1.0)]
    pub stats: f64,
}

#[derive(Args, Debug, Clone)]
pub struct SniffOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 1.0)]
    pub stats: f64,
}

pub fn stats_interval(secs: f64) -> anyhow::Result<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        bail!("stats interval must be a positive number of seconds");
    }
    Ok(Duration::from_secs_f64(secs))
}
