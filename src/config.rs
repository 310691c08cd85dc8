use std::collections::HashSet;
use std::time::Duration;

use crate::error::LinkError;
use crate::scheduler::PollPolicy;

/// How long a transaction may hold the channel.
pub const TIMEOUT: Duration = Duration::from_millis(300);
/// How long a kick stays latched in outgoing commands.
pub const KICK_TIME: Duration = Duration::from_millis(150);
/// How long the reboot flag stays latched in outgoing commands.
pub const REBOOT_TIME: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub timeout: Duration,
    pub kick_time: Duration,
    pub reboot_time: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            timeout: TIMEOUT,
            kick_time: KICK_TIME,
            reboot_time: REBOOT_TIME,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Robot addresses in scheduling order.
    pub robots: Vec<u64>,
    pub poll: PollPolicy,
    pub timing: Timing,
}

impl LinkConfig {
    pub fn new(robots: Vec<u64>) -> Result<Self, LinkError> {
        if robots.is_empty() {
            return Err(LinkError::NoRobots);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = robots.iter().find(|a| !seen.insert(**a)) {
            return Err(LinkError::DuplicateAddress(*dup));
        }
        Ok(Self {
            robots,
            poll: PollPolicy::default(),
            timing: Timing::default(),
        })
    }

    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}

/// Parses a 64-bit radio address written in hex, with or without a `0x` prefix.
pub fn parse_address(s: &str) -> Result<u64, LinkError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || digits.len() > 16 {
        return Err(LinkError::BadAddress(s.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| LinkError::BadAddress(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        assert_eq!(parse_address("0013A200405A1B2C").unwrap(), 0x0013_A200_405A_1B2C);
        assert_eq!(parse_address("0xff").unwrap(), 0xFF);
        assert!(matches!(parse_address(""), Err(LinkError::BadAddress(_))));
        assert!(matches!(parse_address("0x"), Err(LinkError::BadAddress(_))));
        assert!(matches!(parse_address("12345678901234567"), Err(LinkError::BadAddress(_))));
        assert!(matches!(parse_address("robot"), Err(LinkError::BadAddress(_))));
    }

    #[test]
    fn validates_robot_list() {
        assert!(matches!(LinkConfig::new(vec![]), Err(LinkError::NoRobots)));
        assert!(matches!(
            LinkConfig::new(vec![1, 2, 1]),
            Err(LinkError::DuplicateAddress(1))
        ));
        let cfg = LinkConfig::new(vec![3, 1, 2]).unwrap();
        assert_eq!(cfg.robots, vec![3, 1, 2]);
        assert_eq!(cfg.poll, PollPolicy::Converging);
        assert_eq!(cfg.timing.timeout, Duration::from_millis(300));
    }
}
