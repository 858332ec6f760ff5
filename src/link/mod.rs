//! Device transport layer
//!
//! The gateway talks to the robot through the [`RobotLink`] trait: an
//! asynchronous, ordered, fire-and-forget command queue plus a bounded-wait
//! frame reader. [`SerialLink`] implements it over the Roomba Open Interface;
//! [`MockLink`] is a hardware-free implementation for tests and simulation.

use crate::error::Result;
use crate::types::{ModeCommand, SensorFrame};
use std::time::Duration;

mod mock;
pub mod protocol;
mod serial;

pub use mock::MockLink;
pub use serial::SerialLink;

/// Transport contract to the robot.
///
/// Commands are queued and delivered in order by the transport worker, but
/// there is no acknowledgment of when a command actually reaches the robot.
pub trait RobotLink: Send + Sync {
    /// Open the transport and start its worker thread
    fn connect(&self) -> Result<()>;

    /// Queue a mode command for delivery (fire-and-forget)
    fn send_mode(&self, mode: ModeCommand) -> Result<()>;

    /// Wait up to `timeout` for the next decoded sensor frame.
    ///
    /// Returns `Ok(None)` on timeout. The bounded wait is what lets the
    /// watchdog observe its stop flag during shutdown instead of blocking
    /// forever on a read from a torn-down transport.
    fn recv_frame(&self, timeout: Duration) -> Result<Option<SensorFrame>>;

    /// Zero the link-side position accumulator (robot freshly docked)
    fn reset_position(&self);

    /// Stop the worker thread and close the transport
    fn disconnect(&self) -> Result<()>;
}
