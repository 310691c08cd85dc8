use anyhow::{Context, Result};
use std::io::{ErrorKind, Read};
use std::time::Instant;
use tracing::{debug, info};

use xbee_link::frame::{Frame, FrameDecoder};
use xbee_link::proto::command::{CommandPacket, flags};
use xbee_link::proto::{FrameType, Inbound};
use xbee_link::session::Addr;
use xbee_link::stats::{LinkStats, StatsReporter};

use crate::cli::{SniffOpts, stats_interval};
use crate::port::open_port;

pub fn run(opts: SniffOpts) -> Result<()> {
    debug!("sniff: {:?}", opts);
    let interval = stats_interval(opts.stats)?;
    let mut port = open_port(&opts.ser)?;
    let mut decoder = FrameDecoder::new();
    let mut reporter = StatsReporter::new(interval, Instant::now());
    let mut buf = [0u8; 256];

    info!(dev = %opts.ser.dev, baud = opts.ser.baud, "listening");

    loop {
        match port.read(&mut buf) {
            Ok(n) => decoder.extend(&buf[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) => return Err(e).context("serial read"),
        }

        while let Some(frame) = decoder.next_frame() {
            show(&frame);
        }

        let stats = LinkStats {
            codec: decoder.counters(),
            ..LinkStats::default()
        };
        reporter.maybe_log(Instant::now(), stats, &[]);
    }
}

fn show(frame: &Frame) {
    if frame.frame_type == FrameType::Tx64Request.code() {
        match CommandPacket::decode(&frame.payload) {
            Some(cmd) => info!(
                frame = cmd.frame_number.get(),
                dest = %Addr(cmd.dest),
                vx = cmd.setpoints.vx,
                vy = cmd.setpoints.vy,
                vt = cmd.setpoints.vt,
                dribble = cmd.setpoints.dribble,
                kick = cmd.setpoints.kick,
                run = cmd.has(flags::RUN),
                reboot = cmd.has(flags::REBOOT),
                report = cmd.has(flags::REPORT),
                "[CMD ]"
            ),
            None => info!(len = frame.payload.len(), "[CMD?] malformed command"),
        }
        return;
    }

    match Inbound::parse(frame) {
        Ok(Some(Inbound::Ack(st))) => {
            info!(frame = st.frame_number, result = ?st.result, "[ACK ]")
        }
        Ok(Some(Inbound::Telemetry(pkt))) => info!(
            sender = %Addr(pkt.sender),
            rssi = pkt.report.rssi,
            battery = format_args!("{:.2}", pkt.report.battery_volts),
            motor = format_args!("{:.2}", pkt.report.motor_volts),
            firmware = pkt.report.firmware_version,
            gyro = pkt.report.has_gyro,
            "[TLM ]"
        ),
        Ok(Some(Inbound::Modem(status))) => status.log(),
        Ok(None) => debug!(
            frame_type = format_args!("0x{:02X}", frame.frame_type),
            len = frame.payload.len(),
            "[????]"
        ),
        Err(e) => info!("[BAD ] {}", e),
    }
}
