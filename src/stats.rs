use std::time::{Duration, Instant};

use tracing::info;

use crate::frame::CodecCounters;
use crate::scheduler::SchedulerStats;
use crate::session::{Addr, RobotSession};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub codec: CodecCounters,
    pub scheduler: SchedulerStats,
    pub bytes_out: u64,
}

/// Prints link counters every `interval`, with rates over the last interval.
#[derive(Debug, Clone)]
pub struct StatsReporter {
    interval: Duration,
    last: Instant,
    prev: LinkStats,
}

impl StatsReporter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
            prev: LinkStats::default(),
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) >= self.interval
    }

    pub fn maybe_log(&mut self, now: Instant, stats: LinkStats, robots: &[RobotSession]) -> bool {
        if !self.due(now) {
            return false;
        }
        let dur = now.saturating_duration_since(self.last).as_secs_f64().max(1e-3);
        let rx_rate = (stats.codec.bytes - self.prev.codec.bytes) as f64 / dur;
        let tx_rate = (stats.bytes_out - self.prev.bytes_out) as f64 / dur;
        let frames = stats.codec.frames - self.prev.codec.frames;
        let tx_per_s = (stats.scheduler.advances - self.prev.scheduler.advances) as f64 / dur;
        info!(
            frames,
            bad = stats.codec.bad_checksum,
            resync = stats.codec.resyncs,
            malformed = stats.scheduler.malformed,
            tx_per_s = format_args!("{:.0}", tx_per_s),
            rx_bps = format_args!("{:.0}", rx_rate),
            tx_bps = format_args!("{:.0}", tx_rate),
            "link"
        );
        for r in robots {
            let st = r.stats();
            match r.telemetry() {
                Some(t) => info!(
                    robot = %Addr(r.address()),
                    health = %r.health(),
                    battery = format_args!("{:.2}", t.battery_volts),
                    motor = format_args!("{:.2}", t.motor_volts),
                    firmware = t.firmware_version,
                    gyro = t.has_gyro,
                    sent = st.transmits,
                    ack_fail = st.ack_failures,
                    timeouts = st.timeouts,
                    "robot"
                ),
                None => info!(
                    robot = %Addr(r.address()),
                    health = %r.health(),
                    sent = st.transmits,
                    ack_fail = st.ack_failures,
                    timeouts = st.timeouts,
                    "robot"
                ),
            }
        }
        self.prev = stats;
        self.last = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_once_per_interval() {
        let t0 = Instant::now();
        let mut rep = StatsReporter::new(Duration::from_secs(1), t0);
        let mut stats = LinkStats::default();
        assert!(!rep.maybe_log(t0 + Duration::from_millis(999), stats, &[]));
        stats.codec.bytes = 100;
        assert!(rep.maybe_log(t0 + Duration::from_secs(1), stats, &[]));
        assert!(!rep.due(t0 + Duration::from_millis(1500)));
        assert!(rep.due(t0 + Duration::from_secs(2)));
    }
}
