use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the button controller
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Connecting to a panel did not complete in time
    #[error("Timed out after {timeout:?} connecting to {ip}")]
    ConnectTimeout { ip: String, timeout: Duration },

    /// Settings or runtime configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No live session for this IP
    #[error("No session for device {0}")]
    SessionNotFound(String),

    /// The connection manager has been shut down
    #[error("Connection manager has stopped")]
    ManagerStopped,
}

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file could not be read or written
    #[error("Failed to access settings file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings JSON could not be parsed
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// A numeric setting is outside its allowed range
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// LED colours must be `#RRGGBB`
    #[error("Invalid LED colour {0:?}, expected #RRGGBB")]
    InvalidColor(String),

    /// Two device slots share an index
    #[error("Device index {0} is used more than once")]
    DuplicateDeviceIndex(usize),

    /// Two device slots point at the same panel
    #[error("Device IP {0} is configured more than once")]
    DuplicateDeviceIp(String),

    /// Runtime configuration rejected
    #[error("Invalid controller configuration: {0}")]
    Invalid(String),
}

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;
