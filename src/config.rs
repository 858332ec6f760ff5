//! Configuration for the Roomba gateway
//!
//! Loads configuration from a TOML file. Every timing the supervisor uses is
//! a config field so tests can run with millisecond intervals instead of the
//! wall-clock defaults.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub hardware: HardwareConfig,
    pub supervisor: SupervisorConfig,
    pub battery: BatteryConfig,
}

/// Hardware configuration (serial link)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// Roomba serial device
    pub serial_port: String,
    /// Serial baud rate
    pub baud_rate: u32,
}

/// Supervisor timing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// Settle delay after opening / before tearing down the link (ms)
    pub settle_ms: u64,

    /// Watchdog throttle between iterations, independent of frame rate (ms)
    pub watch_interval_ms: u64,

    /// Gap between the two dock commands sent by `stop()` (ms)
    pub dock_resend_gap_ms: u64,

    /// How long the watchdog waits for a frame before treating the link
    /// as silent and forcing the error status (ms)
    pub frame_timeout_ms: u64,
}

impl SupervisorConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn dock_resend_gap(&self) -> Duration {
        Duration::from_millis(self.dock_resend_gap_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

/// Battery charge thresholds (percent)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatteryConfig {
    /// Level at or below which the battery counts as discharged
    pub low_level: i16,
    /// Level at or above which the battery counts as charged again
    pub high_level: i16,
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// - `path`: Path to TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration for a Roomba 500 on the gateway serial port
    pub fn roomba_defaults() -> Self {
        Self {
            hardware: HardwareConfig {
                serial_port: "/dev/ttyROOMBA".to_string(),
                baud_rate: 115_200,
            },
            supervisor: SupervisorConfig {
                settle_ms: 1000,
                watch_interval_ms: 1000,
                dock_resend_gap_ms: 1000,
                frame_timeout_ms: 5000,
            },
            battery: BatteryConfig {
                low_level: 20,
                high_level: 80,
            },
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::roomba_defaults()
    }
}
