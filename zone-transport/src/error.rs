use std::time::Duration;

use thiserror::Error;

use crate::zone::ZoneRef;

/// Errors returned by a transport implementation
#[derive(Debug, Error)]
pub enum TransportError {
    /// No controlling service is paired
    #[error("Transport is not available")]
    Unavailable,

    /// The zone reference does not resolve to a known zone
    #[error("Zone not found: {0}")]
    ZoneNotFound(ZoneRef),

    /// The service refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The service did not answer in time
    #[error("Transport call timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
