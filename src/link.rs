//! Single-threaded event loop tying the codec to the scheduler.
//!
//! All session and scheduler state changes happen inside `process`, one frame
//! or timer at a time, so the one-open-transaction rule never sees two events
//! interleave.

use std::io::{self, Read, Write};
use std::time::Instant;

use tracing::info;

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::frame::{FrameDecoder, FrameWriter};
use crate::scheduler::ChannelScheduler;
use crate::stats::LinkStats;

const READ_CHUNK: usize = 256;

#[derive(Debug)]
pub struct Link<P> {
    writer: FrameWriter<P>,
    decoder: FrameDecoder,
    scheduler: ChannelScheduler,
    buf: [u8; READ_CHUNK],
}

impl<P: Read + Write> Link<P> {
    pub fn new(port: P, config: &LinkConfig) -> Result<Self, LinkError> {
        let scheduler = ChannelScheduler::new(config)?;
        info!(
            robots = scheduler.len(),
            poll = %scheduler.policy(),
            "registered robot addresses"
        );
        Ok(Self {
            writer: FrameWriter::new(port),
            decoder: FrameDecoder::new(),
            scheduler,
            buf: [0; READ_CHUNK],
        })
    }

    pub fn scheduler(&self) -> &ChannelScheduler {
        &self.scheduler
    }

    /// Setpoint access for the control layer.
    pub fn scheduler_mut(&mut self) -> &mut ChannelScheduler {
        &mut self.scheduler
    }

    pub fn port(&self) -> &P {
        self.writer.get_ref()
    }

    pub fn port_mut(&mut self) -> &mut P {
        self.writer.get_mut()
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            codec: self.decoder.counters(),
            scheduler: self.scheduler.stats(),
            bytes_out: self.writer.bytes_out(),
        }
    }

    pub fn start(&mut self, now: Instant) -> Result<(), LinkError> {
        self.scheduler.start(now, &mut self.writer);
        self.check_writer()
    }

    /// Reads whatever the transport has ready. A read timeout counts as no data.
    pub fn pump(&mut self) -> Result<usize, LinkError> {
        match self.writer.get_mut().read(&mut self.buf) {
            Ok(n) => {
                self.decoder.extend(&self.buf[..n]);
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Routes every complete frame received so far, then runs timers up to `now`.
    pub fn process(&mut self, now: Instant) -> Result<(), LinkError> {
        while let Some(frame) = self.decoder.next_frame() {
            self.scheduler.handle_frame(&frame, now, &mut self.writer);
        }
        self.scheduler.poll(now, &mut self.writer);
        self.check_writer()
    }

    fn check_writer(&mut self) -> Result<(), LinkError> {
        match self.writer.take_fault() {
            Some(e) => Err(LinkError::Io(e)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, encode_frame};
    use crate::proto::FrameType;
    use crate::proto::command::{CommandPacket, flags};
    use crate::proto::report::encode_rx;
    use crate::session::LinkHealth;
    use std::collections::VecDeque;
    use std::time::Duration;

    #[derive(Default)]
    struct MockPort {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        broken: bool,
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.rx.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(self.rx.len());
            for (slot, b) in buf.iter_mut().zip(self.rx.drain(..n)) {
                *slot = b;
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    const ROBOTS: [u64; 2] = [0x0013_A200_4000_0001, 0x0013_A200_4000_0002];

    fn link() -> Link<MockPort> {
        let cfg = LinkConfig::new(ROBOTS.to_vec()).unwrap();
        Link::new(MockPort::default(), &cfg).unwrap()
    }

    fn sent_commands(link: &Link<MockPort>) -> Vec<CommandPacket> {
        let mut dec = FrameDecoder::new();
        dec.extend(&link.port().tx);
        dec.map(|f: Frame| {
            assert_eq!(f.frame_type, FrameType::Tx64Request.code());
            CommandPacket::decode(&f.payload).unwrap()
        })
        .collect()
    }

    fn feed(link: &mut Link<MockPort>, bytes: &[u8]) {
        link.port_mut().rx.extend(bytes.iter().copied());
        while link.pump().unwrap() > 0 {}
    }

    #[test]
    fn exchange_over_byte_stream() {
        let t0 = Instant::now();
        let mut link = link();
        link.start(t0).unwrap();
        let cmds = sent_commands(&link);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].dest, ROBOTS[0]);
        assert!(cmds[0].has(flags::REPORT));

        let mut inbound = vec![0x13, 0x37];
        inbound.extend(encode_frame(0x80, &encode_rx(ROBOTS[0], 44, 1650, 1480, 7, true)).unwrap());
        inbound.extend(encode_frame(0x89, &[cmds[0].frame_number.get(), 0]).unwrap());

        // Half the bytes arrive first; nothing is complete enough to resolve.
        let split = inbound.len() - 3;
        feed(&mut link, &inbound[..split]);
        link.process(t0).unwrap();
        assert_eq!(sent_commands(&link).len(), 1);

        feed(&mut link, &inbound[split..]);
        link.process(t0 + Duration::from_millis(20)).unwrap();
        let cmds = sent_commands(&link);
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1].dest, ROBOTS[1]);

        let robot = link.scheduler().session(0).unwrap();
        assert_eq!(robot.health(), LinkHealth::Ok);
        assert_eq!(robot.telemetry().unwrap().firmware_version, 7);

        let stats = link.stats();
        assert_eq!(stats.codec.frames, 2);
        assert_eq!(stats.codec.resyncs, 1);
        assert_eq!(stats.scheduler.advances, 2);
        assert_eq!(stats.bytes_out, link.port().tx.len() as u64);
    }

    #[test]
    fn silence_advances_on_timeout() {
        let t0 = Instant::now();
        let mut link = link();
        link.start(t0).unwrap();
        assert_eq!(link.pump().unwrap(), 0);
        link.process(t0 + Duration::from_millis(299)).unwrap();
        assert_eq!(sent_commands(&link).len(), 1);
        link.process(t0 + Duration::from_millis(300)).unwrap();
        assert_eq!(sent_commands(&link).len(), 2);
    }

    #[test]
    fn write_failure_is_fatal() {
        let t0 = Instant::now();
        let mut link = link();
        link.port_mut().broken = true;
        assert!(matches!(link.start(t0), Err(LinkError::Io(_))));
    }
}
