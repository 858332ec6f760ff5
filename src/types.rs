//! Core data types shared between the controller, the watchdog and the link.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Battery sentinel used when no valid telemetry is available
pub const BATTERY_UNKNOWN: i16 = -1;

/// Operational status of the robot.
///
/// Exactly one value is active at a time. Command methods mutate it on
/// acceptance, the watchdog mutates it on safety-relevant sensor events.
///
/// `Error` is terminal until a fresh `init()` cycle: nothing in the gateway
/// clears it automatically, and the watchdog keeps issuing a safety stop for
/// as long as it persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Error,
    Closed,
    Init,
    Docked,
    Moving,
    Paused,
    SearchingDock,
}

impl Status {
    /// Numeric rank used by command preconditions.
    ///
    /// Motion commands are accepted from `Init` (rank 1) upward. `Paused`
    /// and `SearchingDock` deliberately share rank 4, which is why this is
    /// a method rather than enum discriminants.
    pub fn rank(self) -> i8 {
        match self {
            Status::Error => -1,
            Status::Closed => 0,
            Status::Init => 1,
            Status::Docked => 2,
            Status::Moving => 3,
            Status::Paused | Status::SearchingDock => 4,
        }
    }

    /// Whether motion commands may be issued in this status
    pub fn accepts_motion(self) -> bool {
        self.rank() >= Status::Init.rank()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Error => "error",
            Status::Closed => "closed",
            Status::Init => "init",
            Status::Docked => "docked",
            Status::Moving => "moving",
            Status::Paused => "paused",
            Status::SearchingDock => "searching_dock",
        };
        f.write_str(name)
    }
}

/// Mode command sent to the robot to change its active behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeCommand {
    /// Autonomous cleaning motion
    Clean,
    /// Seek the charging dock
    Dock,
    /// Passive safe mode (motion stopped, sensors live)
    Safe,
}

impl fmt::Display for ModeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeCommand::Clean => "clean",
            ModeCommand::Dock => "dock",
            ModeCommand::Safe => "safe",
        };
        f.write_str(name)
    }
}

/// One decoded snapshot of all supervised sensor fields.
///
/// Replaced wholesale on each poll, never partially merged.
#[derive(Debug, Clone, Default)]
pub struct SensorFrame {
    /// Robot is in contact with the charging base
    pub home_base: bool,
    /// Left wheel motor overcurrent
    pub overcurrent_left: bool,
    /// Right wheel motor overcurrent
    pub overcurrent_right: bool,
    /// Left wheel dropped (robot lifted or over an edge)
    pub wheel_drop_left: bool,
    /// Right wheel dropped
    pub wheel_drop_right: bool,
    /// Battery charge in mAh
    pub battery_charge: u16,
    /// Battery capacity in mAh
    pub battery_capacity: u16,
    /// Dead-reckoned position, meters
    pub x: f64,
    /// Dead-reckoned position, meters
    pub y: f64,
    /// Heading, radians
    pub theta: f64,
}

/// Dead-reckoned pose of the robot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Meters
    pub x: f64,
    /// Meters
    pub y: f64,
    /// Radians
    pub theta: f64,
}

impl Position {
    /// Origin pose, used when the robot is freshly docked
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        theta: 0.0,
    };
}

/// Coarse battery energy state derived from the charge thresholds.
///
/// Uses hysteresis: the state flips to `Discharged` when the level falls to
/// the low threshold and back to `Charged` when it reaches the high one, so
/// it does not flap around a single boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    /// No valid telemetry yet
    Unknown,
    /// Level reached the high threshold since the last discharge
    Charged,
    /// Level fell to the low threshold
    Discharged,
}
