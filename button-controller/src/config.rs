//! Runtime configuration for the connection manager
//!
//! These values tune how the controller talks to panels. They are separate
//! from [`Settings`](crate::Settings), which describe *which* panels to talk
//! to and what their buttons do.

use std::time::Duration;

use crate::error::ConfigError;

/// TCP port panels listen on
pub const DEFAULT_DEVICE_PORT: u16 = 10001;

/// Configuration for the ConnectionManager
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// TCP port to connect to on each panel
    /// Default: 10001
    pub device_port: u16,

    /// How often configured devices are reconciled against live sessions
    /// Default: 1 second
    pub scan_interval: Duration,

    /// Interval between `led=?` keep-alive probes on a connected session
    /// Default: 10 seconds
    pub keepalive_interval: Duration,

    /// Upper bound on a single connection attempt
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Upper bound on a single transport call made for a key press or LED sync
    /// Default: 3 seconds
    pub transport_timeout: Duration,

    /// Capacity of the controller event broadcast channel
    /// Default: 256
    pub event_buffer_size: usize,

    /// Capacity of each session's command queue
    /// Default: 64
    pub command_buffer_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_port: DEFAULT_DEVICE_PORT,
            scan_interval: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            transport_timeout: Duration::from_secs(3),
            event_buffer_size: 256,
            command_buffer_size: 64,
        }
    }
}

impl ControllerConfig {
    /// Create a new ControllerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_port == 0 {
            return Err(ConfigError::Invalid(
                "Device port must not be 0".to_string(),
            ));
        }

        if self.scan_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "Scan interval must be greater than 0".to_string(),
            ));
        }

        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "Keep-alive interval must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        if self.transport_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "Transport timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 || self.command_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "Buffer sizes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_device_port(mut self, port: u16) -> Self {
        self.device_port = port;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}
