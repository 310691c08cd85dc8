//! Radio modem API framing.
//!
//! `0x7E | len_hi | len_lo | type | payload... | checksum`, where the length
//! covers the type byte plus the payload and the checksum is
//! `0xFF - (sum of type and payload bytes)`.

use std::io::{self, Write};

use tracing::{error, warn};

use crate::error::LinkError;

pub const START_BYTE: u8 = 0x7E;

/// Largest payload whose length (plus the type byte) fits the u16 length field.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - 1;

/// Start byte, two length bytes, checksum.
const OVERHEAD: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }
}

pub fn checksum(frame_type: u8, payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .fold(frame_type, |acc, &b| acc.wrapping_add(b));
    0xFF - sum
}

pub fn encode_frame(frame_type: u8, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(LinkError::PayloadTooLarge(payload.len()));
    }
    let len = (payload.len() + 1) as u16;
    let mut out = Vec::with_capacity(payload.len() + OVERHEAD + 1);
    out.push(START_BYTE);
    out.extend_from_slice(&len.to_be_bytes());
    out.push(frame_type);
    out.extend_from_slice(payload);
    out.push(checksum(frame_type, payload));
    Ok(out)
}

/// Running totals kept by the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecCounters {
    pub bytes: u64,
    pub frames: u64,
    pub bad_checksum: u64,
    pub resyncs: u64,
}

/// Receive side of the codec. Bytes go in as the transport delivers them,
/// frames come out in arrival order. Corruption is dropped and logged; the
/// decoder never reports an error to its caller.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    counters: CodecCounters,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.counters.bytes += bytes.len() as u64;
        self.buf.extend_from_slice(bytes);
    }

    pub fn counters(&self) -> CodecCounters {
        self.counters
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if self.buf.first().is_some_and(|&b| b != START_BYTE) {
                warn!(buffered = self.buf.len(), "serial stream synchronization lost");
                self.counters.resyncs += 1;
                match self.buf.iter().position(|&b| b == START_BYTE) {
                    Some(pos) => {
                        self.buf.drain(..pos);
                    }
                    None => self.buf.clear(),
                }
            }

            if self.buf.len() < 3 {
                return None;
            }

            let len = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
            let total = len + OVERHEAD;
            if self.buf.len() < total {
                return None;
            }

            let body = &self.buf[3..3 + len];
            let received = self.buf[3 + len];
            let valid = match body.split_first() {
                Some((&frame_type, payload)) => checksum(frame_type, payload) == received,
                None => false,
            };

            if !valid {
                warn!(len, "received frame with bad checksum");
                self.counters.bad_checksum += 1;
                // The length may be the corrupted byte, so only the start byte is
                // known to be spent. Everything after it is rescanned.
                self.buf.drain(..1);
                continue;
            }

            let frame = Frame::new(body[0], &body[1..]);
            self.buf.drain(..total);
            self.counters.frames += 1;
            return Some(frame);
        }
    }
}

impl Iterator for FrameDecoder {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.next_frame()
    }
}

/// Outbound half of the codec. Sending never fails from the caller's point of view.
pub trait FrameSink {
    fn send_frame(&mut self, frame_type: u8, payload: &[u8]);
}

/// Collects frames in memory instead of writing them out.
impl FrameSink for Vec<Frame> {
    fn send_frame(&mut self, frame_type: u8, payload: &[u8]) {
        self.push(Frame::new(frame_type, payload));
    }
}

/// Writes whole frames to a byte stream. The first write error is latched
/// and later frames are discarded until the owner collects it.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    fault: Option<io::Error>,
    bytes_out: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            fault: None,
            bytes_out: 0,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    pub fn take_fault(&mut self) -> Option<io::Error> {
        self.fault.take()
    }
}

impl<W: Write> FrameSink for FrameWriter<W> {
    fn send_frame(&mut self, frame_type: u8, payload: &[u8]) {
        if self.fault.is_some() {
            return;
        }
        let bytes = match encode_frame(frame_type, payload) {
            Ok(b) => b,
            Err(e) => {
                error!("dropping outbound frame: {}", e);
                return;
            }
        };
        let res = self.inner.write_all(&bytes).and_then(|_| self.inner.flush());
        match res {
            Ok(()) => self.bytes_out += bytes.len() as u64,
            Err(e) => {
                error!("serial write failed: {}", e);
                self.fault = Some(e);
            }
        }
    }
}
