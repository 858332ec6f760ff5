//! Error types for the Roomba gateway

use crate::types::Status;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Roomba gateway error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration serialization error
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Robot connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation rejected because the controller is in the wrong status
    #[error("{op} rejected in status '{status}'")]
    BadState {
        /// Name of the rejected operation
        op: &'static str,
        /// Status observed at the time of the call
        status: Status,
    },

    /// Link operation attempted while disconnected
    #[error("Link not connected")]
    NotConnected,

    /// Command queue closed (transport worker gone)
    #[error("Command queue closed")]
    QueueClosed,

    /// Background thread panicked
    #[error("Background thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
