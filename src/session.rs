//! Per-robot state: setpoints, one-shot latches, the in-flight transaction
//! and the link health classifier.

use std::fmt;
use std::num::NonZeroU8;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::Timing;
use crate::frame::FrameSink;
use crate::proto::FrameType;
use crate::proto::command::{CommandPacket, Setpoints, flags};
use crate::proto::report::TelemetryReport;
use crate::proto::status::AckResult;

/// Consecutive failures needed to change health.
pub const FAILURE_THRESHOLD: u8 = 4;

/// Displays a radio address the way it is written on the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr(pub u64);

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkHealth {
    /// Telemetry is arriving.
    Ok,
    /// Commands are acknowledged but no telemetry comes back.
    NoReception,
    /// Commands are not being acknowledged. Nothing is known to work yet.
    #[default]
    NoAcknowledgement,
}

impl LinkHealth {
    fn rank(self) -> u8 {
        match self {
            LinkHealth::Ok => 2,
            LinkHealth::NoReception => 1,
            LinkHealth::NoAcknowledgement => 0,
        }
    }
}

impl fmt::Display for LinkHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkHealth::Ok => "OK",
            LinkHealth::NoReception => "NO-RECV",
            LinkHealth::NoAcknowledgement => "NO-ACK",
        })
    }
}

/// What the session wants done with the channel after an event.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handback {
    /// Nothing changed, or the transaction is still open.
    Keep,
    /// The transaction just closed; the channel is free.
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    EmergencyStop,
    Operator,
}

impl KillReason {
    const fn bit(self) -> u8 {
        match self {
            KillReason::EmergencyStop => 1 << 0,
            KillReason::Operator => 1 << 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub frame_number: NonZeroU8,
    pub awaiting_ack: bool,
    pub awaiting_report: bool,
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub transmits: u64,
    pub reports: u64,
    pub ack_failures: u64,
    pub report_misses: u64,
    pub timeouts: u64,
    pub gratuitous_acks: u64,
}

/// Saturating count of consecutive failures.
#[derive(Debug, Clone, Copy, Default)]
struct Hysteresis {
    count: u8,
}

impl Hysteresis {
    /// Returns true while the count sits at the threshold.
    fn fail(&mut self) -> bool {
        self.count = (self.count + 1).min(FAILURE_THRESHOLD);
        self.count == FAILURE_THRESHOLD
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// A value that clears itself once its dwell has passed.
#[derive(Debug, Clone, Copy)]
struct Latch<T> {
    armed: Option<(T, Instant)>,
}

impl<T: Copy> Latch<T> {
    const fn new() -> Self {
        Self { armed: None }
    }

    /// No-op while already armed, so one pulse never gets extended.
    fn arm(&mut self, value: T, now: Instant, dwell: Duration) -> bool {
        if self.armed.is_some() {
            return false;
        }
        self.armed = Some((value, now + dwell));
        true
    }

    fn expire(&mut self, now: Instant) -> bool {
        match self.armed {
            Some((_, at)) if now >= at => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    fn get(&self) -> Option<T> {
        self.armed.map(|(v, _)| v)
    }

    fn clear(&mut self) {
        self.armed = None;
    }
}

#[derive(Debug)]
pub struct RobotSession {
    address: u64,
    timing: Timing,

    vx: i8,
    vy: i8,
    vt: i8,
    dribble: u8,
    kick: Latch<u8>,
    reboot: Latch<()>,
    kill_reasons: u8,

    txn: Option<Transaction>,
    health: LinkHealth,
    ack_errors: Hysteresis,
    report_misses: Hysteresis,
    telemetry: Option<TelemetryReport>,
    stats: SessionStats,
}

fn scale_signed(v: f64) -> i8 {
    (v.clamp(-1.0, 1.0) * 127.0) as i8
}

fn scale_unsigned(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

impl RobotSession {
    pub fn new(address: u64, timing: Timing) -> Self {
        Self {
            address,
            timing,
            vx: 0,
            vy: 0,
            vt: 0,
            dribble: 0,
            kick: Latch::new(),
            reboot: Latch::new(),
            kill_reasons: 0,
            txn: None,
            health: LinkHealth::default(),
            ack_errors: Hysteresis::default(),
            report_misses: Hysteresis::default(),
            telemetry: None,
            stats: SessionStats::default(),
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn health(&self) -> LinkHealth {
        self.health
    }

    /// Latest telemetry, if any has ever arrived.
    pub fn telemetry(&self) -> Option<&TelemetryReport> {
        self.telemetry.as_ref()
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.txn.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn set_velocity(&mut self, vx: f64, vy: f64, vt: f64) {
        self.vx = scale_signed(vx);
        self.vy = scale_signed(vy);
        self.vt = scale_signed(vt);
    }

    pub fn set_dribbler(&mut self, power: f64) {
        self.dribble = scale_unsigned(power);
    }

    /// Latches a kick for `kick_time`. Ignored while a kick is already latched
    /// or when the clamped strength rounds to zero.
    pub fn kick(&mut self, strength: f64, now: Instant) {
        let value = scale_unsigned(strength);
        if value == 0 {
            return;
        }
        if self.kick.arm(value, now, self.timing.kick_time) {
            debug!(robot = %Addr(self.address), strength = value, "kick latched");
        }
    }

    /// Latches the reboot flag for `reboot_time` and drops any pending kick.
    pub fn reboot(&mut self, now: Instant) {
        if self.reboot.arm((), now, self.timing.reboot_time) {
            self.kick.clear();
            info!(robot = %Addr(self.address), "reboot requested");
        }
    }

    pub fn set_kill(&mut self, reason: KillReason, active: bool) {
        if active {
            self.kill_reasons |= reason.bit();
        } else {
            self.kill_reasons &= !reason.bit();
        }
    }

    pub fn run_enabled(&self) -> bool {
        self.kill_reasons == 0
    }

    pub fn kick_latched(&self) -> bool {
        self.kick.get().is_some()
    }

    pub fn reboot_latched(&self) -> bool {
        self.reboot.get().is_some()
    }

    /// What the next command will carry.
    pub fn setpoints(&self) -> Setpoints {
        Setpoints {
            vx: self.vx,
            vy: self.vy,
            vt: self.vt,
            dribble: self.dribble,
            kick: self.kick.get().unwrap_or(0),
        }
    }

    pub fn expire_latches(&mut self, now: Instant) {
        if self.kick.expire(now) {
            trace!(robot = %Addr(self.address), "kick cleared");
        }
        if self.reboot.expire(now) {
            debug!(robot = %Addr(self.address), "reboot flag cleared");
        }
    }

    /// Runs the latch timers and the transaction deadline up to `now`.
    pub(crate) fn poll(&mut self, now: Instant) -> Handback {
        self.expire_latches(now);
        match self.txn {
            Some(t) if now >= t.deadline => self.on_deadline_expired(),
            _ => Handback::Keep,
        }
    }

    /// Sends the current command and opens a transaction. The caller must own
    /// the channel.
    pub(crate) fn transmit(
        &mut self,
        frame_number: NonZeroU8,
        request_report: bool,
        now: Instant,
        sink: &mut dyn FrameSink,
    ) {
        debug_assert!(self.txn.is_none(), "transmit with a transaction open");
        self.expire_latches(now);

        let mut bits = 0;
        if self.run_enabled() {
            bits |= flags::RUN;
        }
        if self.reboot_latched() {
            bits |= flags::REBOOT;
        }
        if request_report {
            bits |= flags::REPORT;
        }
        let pkt = CommandPacket {
            frame_number,
            dest: self.address,
            options: 0,
            setpoints: self.setpoints(),
            flags: bits,
        };
        sink.send_frame(FrameType::Tx64Request.code(), &pkt.encode());

        self.txn = Some(Transaction {
            frame_number,
            awaiting_ack: true,
            awaiting_report: request_report,
            deadline: now + self.timing.timeout,
        });
        self.stats.transmits += 1;
        trace!(robot = %Addr(self.address), frame = frame_number.get(), request_report, "command sent");
    }

    pub(crate) fn on_ack(&mut self, frame_number: u8, result: AckResult) -> Handback {
        match self.txn.as_mut() {
            Some(t) if t.awaiting_ack && t.frame_number.get() == frame_number => {
                t.awaiting_ack = false;
            }
            _ => {
                self.stats.gratuitous_acks += 1;
                debug!(robot = %Addr(self.address), frame = frame_number, "gratuitous ack");
                return Handback::Keep;
            }
        }

        match result {
            AckResult::Ok => {
                self.ack_errors.reset();
                if self.health == LinkHealth::NoAcknowledgement {
                    self.set_health(LinkHealth::NoReception);
                }
            }
            AckResult::NoAck | AckResult::NoClearChannel => {
                // The robot most likely never saw the command, so no report is coming.
                self.stop_waiting_for_report();
                self.ack_failure();
            }
            AckResult::Unknown(code) => {
                warn!(robot = %Addr(self.address), code, "transmit status with unknown code");
                self.stop_waiting_for_report();
            }
        }
        self.settle()
    }

    pub(crate) fn on_telemetry(&mut self, report: TelemetryReport) -> Handback {
        self.ack_errors.reset();
        self.report_misses.reset();
        self.telemetry = Some(report);
        self.stats.reports += 1;
        self.set_health(LinkHealth::Ok);

        let was_waiting = match self.txn.as_mut() {
            Some(t) if t.awaiting_report => {
                t.awaiting_report = false;
                true
            }
            _ => false,
        };
        if was_waiting {
            self.settle()
        } else {
            Handback::Keep
        }
    }

    /// Force-closes the transaction. Always hands the channel back when one was open.
    pub(crate) fn on_deadline_expired(&mut self) -> Handback {
        let Some(txn) = self.txn.take() else {
            return Handback::Keep;
        };
        self.stats.timeouts += 1;
        debug!(
            robot = %Addr(self.address),
            frame = txn.frame_number.get(),
            ack = !txn.awaiting_ack,
            report = !txn.awaiting_report,
            "transaction timed out"
        );
        if txn.awaiting_ack {
            self.ack_failure();
        }
        if txn.awaiting_report {
            self.report_miss();
        }
        Handback::Release
    }

    fn stop_waiting_for_report(&mut self) {
        if let Some(t) = self.txn.as_mut() {
            t.awaiting_report = false;
        }
    }

    fn settle(&mut self) -> Handback {
        match self.txn {
            Some(t) if !t.awaiting_ack && !t.awaiting_report => {
                self.txn = None;
                Handback::Release
            }
            _ => Handback::Keep,
        }
    }

    fn ack_failure(&mut self) {
        self.stats.ack_failures += 1;
        if self.ack_errors.fail() {
            self.set_health(LinkHealth::NoAcknowledgement);
        }
    }

    fn report_miss(&mut self) {
        self.stats.report_misses += 1;
        if self.report_misses.fail() && self.health == LinkHealth::Ok {
            self.set_health(LinkHealth::NoReception);
        }
    }

    fn set_health(&mut self, next: LinkHealth) {
        let prev = self.health;
        if prev == next {
            return;
        }
        self.health = next;
        if next.rank() > prev.rank() {
            info!(robot = %Addr(self.address), from = %prev, to = %next, "link improved");
        } else {
            warn!(robot = %Addr(self.address), from = %prev, to = %next, "link degraded");
        }
    }
}
