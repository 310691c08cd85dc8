use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no robot addresses configured")]
    NoRobots,
    #[error("invalid robot address {0:?}: expected up to 16 hex digits")]
    BadAddress(String),
    #[error("robot address {0:016X} listed more than once")]
    DuplicateAddress(u64),
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
    #[error("transport: {0}")]
    Io(#[from] io::Error),
}
