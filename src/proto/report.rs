use super::{FrameType, ProtoError};

/// Volts per ADC count, for both the logic and the motor battery.
pub const BATTERY_SCALE: f64 = 0.01;
pub const MOTOR_SCALE: f64 = 0.01;

const RX_FLAG_HAS_GYRO: u8 = 1 << 0;

/// Latest telemetry received from one robot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryReport {
    pub battery_volts: f64,
    pub motor_volts: f64,
    pub firmware_version: u16,
    pub has_gyro: bool,
    pub rssi: u8,
}

/// RX64 indication:
/// `sender(u64 BE) rssi options battery(u16 BE) motor(u16 BE) [firmware(u16 BE) flags]`.
///
/// Older firmware stops after the motor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct RxPacket {
    pub sender: u64,
    pub options: u8,
    pub report: TelemetryReport,
}

impl RxPacket {
    pub const SHORT_LEN: usize = 14;
    pub const LONG_LEN: usize = 17;

    pub fn decode(payload: &[u8]) -> Result<Self, ProtoError> {
        if payload.len() != Self::SHORT_LEN && payload.len() != Self::LONG_LEN {
            return Err(ProtoError::BadLength {
                kind: FrameType::Rx64Indication,
                expected: "14 or 17",
                actual: payload.len(),
            });
        }
        let be16 = |i: usize| u16::from_be_bytes([payload[i], payload[i + 1]]);
        let mut sender = [0u8; 8];
        sender.copy_from_slice(&payload[..8]);

        let (firmware_version, has_gyro) = if payload.len() == Self::LONG_LEN {
            (be16(14), payload[16] & RX_FLAG_HAS_GYRO != 0)
        } else {
            (0, false)
        };

        Ok(Self {
            sender: u64::from_be_bytes(sender),
            options: payload[9],
            report: TelemetryReport {
                battery_volts: f64::from(be16(10)) * BATTERY_SCALE,
                motor_volts: f64::from(be16(12)) * MOTOR_SCALE,
                firmware_version,
                has_gyro,
                rssi: payload[8],
            },
        })
    }
}

/// Builds a long-form RX64 payload from raw readings. The robot side of the link.
pub fn encode_rx(
    sender: u64,
    rssi: u8,
    battery: u16,
    motor: u16,
    firmware: u16,
    has_gyro: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(RxPacket::LONG_LEN);
    out.extend_from_slice(&sender.to_be_bytes());
    out.push(rssi);
    out.push(0);
    out.extend_from_slice(&battery.to_be_bytes());
    out.extend_from_slice(&motor.to_be_bytes());
    out.extend_from_slice(&firmware.to_be_bytes());
    out.push(if has_gyro { RX_FLAG_HAS_GYRO } else { 0 });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn long_form() {
        let payload = encode_rx(0x0013_A200_405A_1B2C, 40, 1680, 1495, 0x0203, true);
        let pkt = RxPacket::decode(&payload).unwrap();
        assert_eq!(pkt.sender, 0x0013_A200_405A_1B2C);
        assert_eq!(pkt.report.rssi, 40);
        assert!(close(pkt.report.battery_volts, 16.80));
        assert!(close(pkt.report.motor_volts, 14.95));
        assert_eq!(pkt.report.firmware_version, 0x0203);
        assert!(pkt.report.has_gyro);
    }

    #[test]
    fn short_form_has_no_firmware() {
        let mut payload = encode_rx(5, 0, 1200, 0x0100, 0xFFFF, true);
        payload.truncate(RxPacket::SHORT_LEN);
        let pkt = RxPacket::decode(&payload).unwrap();
        assert_eq!(pkt.sender, 5);
        assert!(close(pkt.report.battery_volts, 12.0));
        assert!(close(pkt.report.motor_volts, 2.56));
        assert_eq!(pkt.report.firmware_version, 0);
        assert!(!pkt.report.has_gyro);
    }

    #[test]
    fn rejects_other_lengths() {
        let payload = encode_rx(5, 0, 0, 0, 0, false);
        assert!(matches!(
            RxPacket::decode(&payload[..15]),
            Err(ProtoError::BadLength { actual: 15, .. })
        ));
    }
}
