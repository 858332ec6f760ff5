//! roomba-gateway - Supervisory controller for a gateway-attached Roomba
//!
//! This library tracks the robot's operational state, issues motion commands
//! over the serial link and continuously monitors the safety-critical sensor
//! readings (wheel drop, overcurrent, docking, battery) from a background
//! watchdog.
//!
//! Two workers run alongside the caller: the serial transport worker (owned
//! by [`link::SerialLink`], driven by `init`/`close`) and the watchdog
//! supervisor. The controller's status cell is the only state with two
//! writers and is mutex-guarded; battery and position are updated wholesale
//! by the watchdog.

pub mod config;
pub mod controller;
pub mod error;
pub mod link;
mod state;
pub mod types;
mod watchdog;

// Re-export commonly used types
pub use config::GatewayConfig;
pub use controller::RobotController;
pub use error::{Error, Result};
pub use link::{MockLink, RobotLink, SerialLink};
pub use types::{BATTERY_UNKNOWN, BatteryState, ModeCommand, Position, SensorFrame, Status};
