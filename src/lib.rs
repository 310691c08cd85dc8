//! Host side of a half-duplex robot radio link.
//!
//! One modem is shared by every robot on the field. Commands go out in
//! round-robin order, one open transaction at a time, and acknowledgements
//! and telemetry coming back decide each robot's [`session::LinkHealth`].

pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod proto;
pub mod scheduler;
pub mod session;
pub mod stats;

pub use config::{LinkConfig, Timing};
pub use error::LinkError;
pub use link::Link;
pub use scheduler::{ChannelScheduler, PollPolicy};
pub use session::{KillReason, LinkHealth, RobotSession};
