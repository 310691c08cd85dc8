//! Round-robin ownership of the shared radio channel.
//!
//! Exactly one session holds an open transaction at a time. Whenever it hands
//! the channel back, the next session in ring order transmits.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU8;
use std::str::FromStr;
use std::time::Instant;

use tracing::{debug, error, trace, warn};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::frame::{Frame, FrameSink};
use crate::proto::Inbound;
use crate::proto::report::RxPacket;
use crate::proto::status::TxStatus;
use crate::session::{Addr, Handback, RobotSession};

/// Which robot gets asked for telemetry on each transmit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollPolicy {
    /// Send and report cursors walk the ring in opposite directions and a
    /// report is requested where they meet. Odd N always polls the same robot;
    /// even N alternates between two.
    #[default]
    Converging,
    /// The report cursor holds for a whole round and steps forward each time
    /// the send cursor wraps, so every robot is polled once per N rounds.
    Rotating,
}

impl FromStr for PollPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("converging") {
            Ok(PollPolicy::Converging)
        } else if s.eq_ignore_ascii_case("rotating") {
            Ok(PollPolicy::Rotating)
        } else {
            Err(format!("poll policy must be 'converging' or 'rotating', got {:?}", s))
        }
    }
}

impl fmt::Display for PollPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PollPolicy::Converging => "converging",
            PollPolicy::Rotating => "rotating",
        })
    }
}

/// Wrapping 1..=255 counter for outbound frame numbers. Zero means "no
/// status wanted" to the modem and is never issued.
#[derive(Debug, Clone)]
pub struct FrameNumbers {
    next: NonZeroU8,
}

impl Default for FrameNumbers {
    fn default() -> Self {
        Self {
            next: NonZeroU8::MIN,
        }
    }
}

impl FrameNumbers {
    pub fn next_number(&mut self) -> NonZeroU8 {
        let n = self.next;
        self.next = NonZeroU8::new(n.get().wrapping_add(1)).unwrap_or(NonZeroU8::MIN);
        n
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleCursor {
    pub send: usize,
    pub report: usize,
}

impl ScheduleCursor {
    fn step(&mut self, n: usize, policy: PollPolicy) {
        self.send = (self.send + 1) % n;
        match policy {
            PollPolicy::Converging => self.report = (self.report + n - 1) % n,
            PollPolicy::Rotating => {
                if self.send == 0 {
                    self.report = (self.report + 1) % n;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub advances: u64,
    pub malformed: u64,
    pub unknown_senders: u64,
    /// Acks that arrived with no transaction open anywhere.
    pub stray_acks: u64,
}

#[derive(Debug)]
pub struct ChannelScheduler {
    sessions: Vec<RobotSession>,
    by_address: HashMap<u64, usize>,
    cursor: ScheduleCursor,
    policy: PollPolicy,
    frame_numbers: FrameNumbers,
    active: Option<usize>,
    started: bool,
    stats: SchedulerStats,
}

impl ChannelScheduler {
    pub fn new(config: &LinkConfig) -> Result<Self, LinkError> {
        if config.robots.is_empty() {
            return Err(LinkError::NoRobots);
        }
        let mut by_address = HashMap::with_capacity(config.robots.len());
        let mut sessions = Vec::with_capacity(config.robots.len());
        for (i, &addr) in config.robots.iter().enumerate() {
            if by_address.insert(addr, i).is_some() {
                return Err(LinkError::DuplicateAddress(addr));
            }
            sessions.push(RobotSession::new(addr, config.timing));
        }
        Ok(Self {
            sessions,
            by_address,
            cursor: ScheduleCursor::default(),
            policy: config.poll,
            frame_numbers: FrameNumbers::default(),
            active: None,
            started: false,
            stats: SchedulerStats::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> &[RobotSession] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut [RobotSession] {
        &mut self.sessions
    }

    pub fn session(&self, index: usize) -> Option<&RobotSession> {
        self.sessions.get(index)
    }

    pub fn session_mut(&mut self, index: usize) -> Option<&mut RobotSession> {
        self.sessions.get_mut(index)
    }

    pub fn session_by_address(&mut self, address: u64) -> Option<&mut RobotSession> {
        let index = *self.by_address.get(&address)?;
        self.sessions.get_mut(index)
    }

    pub fn cursor(&self) -> ScheduleCursor {
        self.cursor
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Index of the session holding the channel.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Makes the first transmission. Later calls do nothing.
    pub fn start(&mut self, now: Instant, sink: &mut dyn FrameSink) {
        if self.started {
            warn!("scheduler already started");
            return;
        }
        self.started = true;
        self.advance(now, sink);
    }

    fn advance(&mut self, now: Instant, sink: &mut dyn FrameSink) {
        if let Some(holder) = self.active {
            error!(holder, "advance with the channel still held");
            return;
        }
        let n = self.sessions.len();
        let index = self.cursor.send;
        let request_report = self.cursor.send == self.cursor.report;
        let frame_number = self.frame_numbers.next_number();
        self.sessions[index].transmit(frame_number, request_report, now, sink);
        self.active = Some(index);
        self.cursor.step(n, self.policy);
        self.stats.advances += 1;
    }

    fn settle(&mut self, index: usize, handback: Handback, now: Instant, sink: &mut dyn FrameSink) {
        if handback == Handback::Keep {
            return;
        }
        if self.active != Some(index) {
            error!(index, active = ?self.active, "release from a session not holding the channel");
            return;
        }
        self.active = None;
        self.advance(now, sink);
    }

    /// Decodes and routes one frame from the modem.
    pub fn handle_frame(&mut self, frame: &Frame, now: Instant, sink: &mut dyn FrameSink) {
        match Inbound::parse(frame) {
            Ok(Some(inbound)) => self.handle(inbound, now, sink),
            Ok(None) => trace!(frame_type = frame.frame_type, "ignoring frame"),
            Err(e) => {
                self.stats.malformed += 1;
                debug!("dropping frame: {}", e);
            }
        }
    }

    pub fn handle(&mut self, inbound: Inbound, now: Instant, sink: &mut dyn FrameSink) {
        match inbound {
            Inbound::Ack(status) => self.on_ack(status, now, sink),
            Inbound::Telemetry(pkt) => self.on_telemetry(pkt, now, sink),
            Inbound::Modem(status) => status.log(),
        }
    }

    /// Acks carry only a frame number, so they go to whoever holds the channel.
    pub fn on_ack(&mut self, status: TxStatus, now: Instant, sink: &mut dyn FrameSink) {
        let Some(index) = self.active else {
            self.stats.stray_acks += 1;
            debug!(frame = status.frame_number, "ack with no transaction open");
            return;
        };
        let handback = self.sessions[index].on_ack(status.frame_number, status.result);
        self.settle(index, handback, now, sink);
    }

    pub fn on_telemetry(&mut self, pkt: RxPacket, now: Instant, sink: &mut dyn FrameSink) {
        let Some(&index) = self.by_address.get(&pkt.sender) else {
            self.stats.unknown_senders += 1;
            debug!(sender = %Addr(pkt.sender), "telemetry from unknown robot");
            return;
        };
        let handback = self.sessions[index].on_telemetry(pkt.report);
        self.settle(index, handback, now, sink);
    }

    /// Runs every session's timers up to `now`.
    pub fn poll(&mut self, now: Instant, sink: &mut dyn FrameSink) {
        for index in 0..self.sessions.len() {
            let handback = self.sessions[index].poll(now);
            self.settle(index, handback, now, sink);
        }
    }
}
