//! Typed payloads carried inside frames.

use thiserror::Error;

use crate::frame::Frame;

pub mod command;
pub mod report;
pub mod status;

use report::RxPacket;
use status::{ModemStatus, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Host to robot, 64-bit destination address.
    Tx64Request,
    /// Robot to host, 64-bit source address.
    Rx64Indication,
    /// Modem's verdict on a `Tx64Request`.
    TxStatus,
    ModemStatus,
}

impl FrameType {
    pub const fn code(self) -> u8 {
        match self {
            FrameType::Tx64Request => 0x00,
            FrameType::Rx64Indication => 0x80,
            FrameType::TxStatus => 0x89,
            FrameType::ModemStatus => 0x8A,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(FrameType::Tx64Request),
            0x80 => Some(FrameType::Rx64Indication),
            0x89 => Some(FrameType::TxStatus),
            0x8A => Some(FrameType::ModemStatus),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("{kind:?} payload has {actual} bytes, expected {expected}")]
    BadLength {
        kind: FrameType,
        expected: &'static str,
        actual: usize,
    },
    #[error("frame type {0:?} is outbound only")]
    Outbound(FrameType),
}

/// Everything the host can receive from the modem.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Telemetry(RxPacket),
    Ack(TxStatus),
    Modem(ModemStatus),
}

impl Inbound {
    /// Maps a decoded frame onto its handler type. Unknown frame types give `Ok(None)`.
    pub fn parse(frame: &Frame) -> Result<Option<Inbound>, ProtoError> {
        let Some(kind) = FrameType::from_code(frame.frame_type) else {
            return Ok(None);
        };
        let inbound = match kind {
            FrameType::Rx64Indication => Inbound::Telemetry(RxPacket::decode(&frame.payload)?),
            FrameType::TxStatus => Inbound::Ack(TxStatus::decode(&frame.payload)?),
            FrameType::ModemStatus => Inbound::Modem(ModemStatus::decode(&frame.payload)?),
            FrameType::Tx64Request => return Err(ProtoError::Outbound(kind)),
        };
        Ok(Some(inbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::status::AckResult;

    #[test]
    fn codes_are_stable() {
        for kind in [
            FrameType::Tx64Request,
            FrameType::Rx64Indication,
            FrameType::TxStatus,
            FrameType::ModemStatus,
        ] {
            assert_eq!(FrameType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(FrameType::from_code(0x08), None);
    }

    #[test]
    fn unknown_type_is_ignored() {
        let frame = Frame::new(0x97, vec![1u8, 2, 3]);
        assert_eq!(Inbound::parse(&frame), Ok(None));
    }

    #[test]
    fn dispatches_ack() {
        let frame = Frame::new(0x89, vec![12u8, 1]);
        match Inbound::parse(&frame).unwrap() {
            Some(Inbound::Ack(st)) => {
                assert_eq!(st.frame_number, 12);
                assert_eq!(st.result, AckResult::NoAck);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn malformed_known_type_is_an_error() {
        let frame = Frame::new(0x89, vec![12u8]);
        assert!(matches!(
            Inbound::parse(&frame),
            Err(ProtoError::BadLength {
                kind: FrameType::TxStatus,
                actual: 1,
                ..
            })
        ));
        let frame = Frame::new(0x00, vec![0u8; 16]);
        assert_eq!(
            Inbound::parse(&frame),
            Err(ProtoError::Outbound(FrameType::Tx64Request))
        );
    }
}
