//! Roomba Open Interface protocol
//!
//! Command opcodes, the sensor query the transport worker polls with, and
//! parsing of the fixed-layout reply into a [`SensorFrame`]. The OI reports
//! incremental travel (distance/angle since the previous poll), so the frame
//! pose comes from a small dead-reckoning integrator kept by the link.

use crate::types::{ModeCommand, Position, SensorFrame};

/// Wake the OI (required once after power-on)
pub const OP_START: u8 = 128;
/// Safe mode: motion stopped, sensors live
pub const OP_SAFE: u8 = 131;
/// Power down the robot
pub const OP_POWER: u8 = 133;
/// Start a cleaning cycle
pub const OP_CLEAN: u8 = 135;
/// Seek the charging dock
pub const OP_DOCK: u8 = 143;
/// Query list: request a one-shot set of sensor packets
pub const OP_QUERY_LIST: u8 = 149;

// Sensor packet ids in the order they are queried
const PKT_BUMPS_WHEELDROPS: u8 = 7;
const PKT_OVERCURRENTS: u8 = 14;
const PKT_BATTERY_CHARGE: u8 = 25;
const PKT_BATTERY_CAPACITY: u8 = 26;
const PKT_DISTANCE: u8 = 19;
const PKT_ANGLE: u8 = 20;
const PKT_CHARGING_SOURCES: u8 = 34;

/// Query-list request sent once per poll cycle
pub const SENSOR_QUERY: [u8; 9] = [
    OP_QUERY_LIST,
    7, // packet count
    PKT_BUMPS_WHEELDROPS,
    PKT_OVERCURRENTS,
    PKT_BATTERY_CHARGE,
    PKT_BATTERY_CAPACITY,
    PKT_DISTANCE,
    PKT_ANGLE,
    PKT_CHARGING_SOURCES,
];

/// Reply length for [`SENSOR_QUERY`]: 1 + 1 + 2 + 2 + 2 + 2 + 1 bytes
pub const SENSOR_REPLY_LEN: usize = 11;

// Bumps & wheel drops flags (packet 7)
const FLAG_WHEEL_DROP_RIGHT: u8 = 0x04;
const FLAG_WHEEL_DROP_LEFT: u8 = 0x08;

// Overcurrent flags (packet 14)
const FLAG_OVERCURRENT_RIGHT: u8 = 0x08;
const FLAG_OVERCURRENT_LEFT: u8 = 0x10;

// Charging sources flags (packet 34)
const FLAG_HOME_BASE: u8 = 0x02;

/// OI opcode for a mode command
pub fn mode_opcode(mode: ModeCommand) -> u8 {
    match mode {
        ModeCommand::Clean => OP_CLEAN,
        ModeCommand::Dock => OP_DOCK,
        ModeCommand::Safe => OP_SAFE,
    }
}

/// Raw fields decoded from one sensor reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSensors {
    pub wheel_drop_left: bool,
    pub wheel_drop_right: bool,
    pub overcurrent_left: bool,
    pub overcurrent_right: bool,
    pub battery_charge: u16,
    pub battery_capacity: u16,
    /// Travel since the previous poll, millimeters
    pub distance_mm: i16,
    /// Turn since the previous poll, degrees (positive = CCW)
    pub angle_deg: i16,
    pub home_base: bool,
}

/// Parse an 11-byte query-list reply. Multi-byte values are big-endian.
///
/// Returns `None` if the buffer is short (truncated read).
pub fn parse_sensor_reply(buf: &[u8]) -> Option<RawSensors> {
    if buf.len() < SENSOR_REPLY_LEN {
        return None;
    }

    Some(RawSensors {
        wheel_drop_left: buf[0] & FLAG_WHEEL_DROP_LEFT != 0,
        wheel_drop_right: buf[0] & FLAG_WHEEL_DROP_RIGHT != 0,
        overcurrent_left: buf[1] & FLAG_OVERCURRENT_LEFT != 0,
        overcurrent_right: buf[1] & FLAG_OVERCURRENT_RIGHT != 0,
        battery_charge: u16::from_be_bytes([buf[2], buf[3]]),
        battery_capacity: u16::from_be_bytes([buf[4], buf[5]]),
        distance_mm: i16::from_be_bytes([buf[6], buf[7]]),
        angle_deg: i16::from_be_bytes([buf[8], buf[9]]),
        home_base: buf[10] & FLAG_HOME_BASE != 0,
    })
}

/// Integrates the OI's incremental distance/angle reports into a pose.
///
/// Owned by the transport worker; reset when the robot re-docks.
#[derive(Debug, Default)]
pub struct DeadReckoner {
    x: f64,
    y: f64,
    theta: f64,
}

impl DeadReckoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one poll's travel into the pose
    pub fn update(&mut self, distance_mm: i16, angle_deg: i16) {
        self.theta += (angle_deg as f64).to_radians();
        // Keep heading in (-pi, pi]
        while self.theta > std::f64::consts::PI {
            self.theta -= 2.0 * std::f64::consts::PI;
        }
        while self.theta <= -std::f64::consts::PI {
            self.theta += 2.0 * std::f64::consts::PI;
        }

        let distance_m = distance_mm as f64 / 1000.0;
        self.x += distance_m * self.theta.cos();
        self.y += distance_m * self.theta.sin();
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
            theta: self.theta,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Combine decoded sensors and the current pose into a frame
pub fn build_frame(raw: &RawSensors, position: Position) -> SensorFrame {
    SensorFrame {
        home_base: raw.home_base,
        overcurrent_left: raw.overcurrent_left,
        overcurrent_right: raw.overcurrent_right,
        wheel_drop_left: raw.wheel_drop_left,
        wheel_drop_right: raw.wheel_drop_right,
        battery_charge: raw.battery_charge,
        battery_capacity: raw.battery_capacity,
        x: position.x,
        y: position.y,
        theta: position.theta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_opcodes() {
        assert_eq!(mode_opcode(ModeCommand::Clean), 135);
        assert_eq!(mode_opcode(ModeCommand::Dock), 143);
        assert_eq!(mode_opcode(ModeCommand::Safe), 131);
    }

    #[test]
    fn test_query_shape() {
        assert_eq!(SENSOR_QUERY[0], OP_QUERY_LIST);
        assert_eq!(SENSOR_QUERY[1] as usize, SENSOR_QUERY.len() - 2);
    }

    #[test]
    fn test_parse_reply() {
        // drop left, overcurrent right, charge=50, capacity=200,
        // distance=-300mm, angle=90deg, on home base
        let buf = [
            0x08, 0x08, 0x00, 0x32, 0x00, 0xC8, 0xFE, 0xD4, 0x00, 0x5A, 0x02,
        ];
        let raw = parse_sensor_reply(&buf).unwrap();
        assert!(raw.wheel_drop_left);
        assert!(!raw.wheel_drop_right);
        assert!(raw.overcurrent_right);
        assert!(!raw.overcurrent_left);
        assert_eq!(raw.battery_charge, 50);
        assert_eq!(raw.battery_capacity, 200);
        assert_eq!(raw.distance_mm, -300);
        assert_eq!(raw.angle_deg, 90);
        assert!(raw.home_base);
    }

    #[test]
    fn test_parse_short_reply() {
        assert!(parse_sensor_reply(&[0u8; 5]).is_none());
    }

    #[test]
    fn test_dead_reckoning_straight() {
        let mut dr = DeadReckoner::new();
        dr.update(500, 0);
        dr.update(500, 0);
        let pose = dr.position();
        assert!((pose.x - 1.0).abs() < 1e-9);
        assert!(pose.y.abs() < 1e-9);
        assert!(pose.theta.abs() < 1e-9);
    }

    #[test]
    fn test_dead_reckoning_turn_then_forward() {
        let mut dr = DeadReckoner::new();
        dr.update(0, 90);
        dr.update(1000, 0);
        let pose = dr.position();
        assert!(pose.x.abs() < 1e-9);
        assert!((pose.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dead_reckoning_reset() {
        let mut dr = DeadReckoner::new();
        dr.update(250, 45);
        dr.reset();
        assert_eq!(dr.position(), Position::ORIGIN);
    }

    #[test]
    fn test_heading_wraps() {
        let mut dr = DeadReckoner::new();
        for _ in 0..5 {
            dr.update(0, 90);
        }
        let theta = dr.position().theta;
        assert!(theta > -std::f64::consts::PI && theta <= std::f64::consts::PI);
        assert!((theta - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }
}
