use std::num::NonZeroU8;

/// Flag bits in the last byte of a command.
pub mod flags {
    pub const RUN: u8 = 1 << 0;
    pub const REBOOT: u8 = 1 << 1;
    pub const REPORT: u8 = 1 << 2;
}

/// Setpoints as they travel on the air.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Setpoints {
    pub vx: i8,
    pub vy: i8,
    pub vt: i8,
    pub dribble: u8,
    pub kick: u8,
}

/// TX64 request payload:
/// `frameNumber(u8) destAddress(u64 BE) options(u8) vx vy vt dribble kick flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    pub frame_number: NonZeroU8,
    pub dest: u64,
    pub options: u8,
    pub setpoints: Setpoints,
    pub flags: u8,
}

impl CommandPacket {
    pub const LEN: usize = 16;

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.frame_number.get();
        out[1..9].copy_from_slice(&self.dest.to_be_bytes());
        out[9] = self.options;
        let s = &self.setpoints;
        out[10] = s.vx as u8;
        out[11] = s.vy as u8;
        out[12] = s.vt as u8;
        out[13] = s.dribble;
        out[14] = s.kick;
        out[15] = self.flags;
        out
    }

    /// Inverse of `encode`; used by the sniffer and by tests.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let bytes: &[u8; Self::LEN] = payload.try_into().ok()?;
        let mut dest = [0u8; 8];
        dest.copy_from_slice(&bytes[1..9]);
        Some(Self {
            frame_number: NonZeroU8::new(bytes[0])?,
            dest: u64::from_be_bytes(dest),
            options: bytes[9],
            setpoints: Setpoints {
                vx: bytes[10] as i8,
                vy: bytes[11] as i8,
                vt: bytes[12] as i8,
                dribble: bytes[13],
                kick: bytes[14],
            },
            flags: bytes[15],
        })
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}
