use tracing::{info, warn};

use super::{FrameType, ProtoError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResult {
    Ok,
    /// The robot never acknowledged at the MAC layer.
    NoAck,
    /// Clear channel assessment failed; nothing went out.
    NoClearChannel,
    Unknown(u8),
}

impl AckResult {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AckResult::Ok,
            1 => AckResult::NoAck,
            2 => AckResult::NoClearChannel,
            other => AckResult::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AckResult::Ok => 0,
            AckResult::NoAck => 1,
            AckResult::NoClearChannel => 2,
            AckResult::Unknown(c) => c,
        }
    }
}

/// Transmit status: `frameNumber(u8) result(u8)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    pub frame_number: u8,
    pub result: AckResult,
}

impl TxStatus {
    pub const LEN: usize = 2;

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        match payload {
            &[frame_number, result] => Ok(Self {
                frame_number,
                result: AckResult::from_code(result),
            }),
            _ => Err(ProtoError::BadLength {
                kind: FrameType::TxStatus,
                expected: "2",
                actual: payload.len(),
            }),
        }
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        [self.frame_number, self.result.code()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemStatus {
    HardwareReset,
    WatchdogReset,
    Associated,
    Disassociated,
    SyncLost,
    CoordinatorRealignment,
    CoordinatorStarted,
    Unknown(u8),
}

impl ModemStatus {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        let &[code] = payload else {
            return Err(ProtoError::BadLength {
                kind: FrameType::ModemStatus,
                expected: "1",
                actual: payload.len(),
            });
        };
        Ok(match code {
            0 => ModemStatus::HardwareReset,
            1 => ModemStatus::WatchdogReset,
            2 => ModemStatus::Associated,
            3 => ModemStatus::Disassociated,
            4 => ModemStatus::SyncLost,
            5 => ModemStatus::CoordinatorRealignment,
            6 => ModemStatus::CoordinatorStarted,
            other => ModemStatus::Unknown(other),
        })
    }

    pub fn log(self) {
        match self {
            ModemStatus::HardwareReset => warn!("modem hardware reset"),
            ModemStatus::WatchdogReset => warn!("modem reset by watchdog"),
            ModemStatus::Associated => info!("modem associated"),
            ModemStatus::Disassociated => info!("modem disassociated"),
            ModemStatus::SyncLost => warn!("modem synchronization lost"),
            ModemStatus::CoordinatorRealignment => warn!("modem coordinator realigning"),
            ModemStatus::CoordinatorStarted => info!("modem coordination started"),
            ModemStatus::Unknown(code) => warn!(code, "unknown modem status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_result_codes() {
        assert_eq!(AckResult::from_code(0), AckResult::Ok);
        assert_eq!(AckResult::from_code(1), AckResult::NoAck);
        assert_eq!(AckResult::from_code(2), AckResult::NoClearChannel);
        assert_eq!(AckResult::from_code(9), AckResult::Unknown(9));
        assert_eq!(AckResult::Unknown(9).code(), 9);
    }

    #[test]
    fn tx_status_layout() {
        let st = TxStatus::decode(&[0xFE, 2]).unwrap();
        assert_eq!(st.frame_number, 0xFE);
        assert_eq!(st.result, AckResult::NoClearChannel);
        assert_eq!(st.encode(), [0xFE, 2]);
        assert!(TxStatus::decode(&[1, 0, 0]).is_err());
    }

    #[test]
    fn modem_status_codes() {
        assert_eq!(ModemStatus::decode(&[2]).unwrap(), ModemStatus::Associated);
        assert_eq!(ModemStatus::decode(&[6]).unwrap(), ModemStatus::CoordinatorStarted);
        assert_eq!(ModemStatus::decode(&[42]).unwrap(), ModemStatus::Unknown(42));
        assert!(ModemStatus::decode(&[]).is_err());
    }
}
