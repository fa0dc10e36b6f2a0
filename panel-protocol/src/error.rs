//! Error types for panel line decoding

use thiserror::Error;

/// Errors that can occur while decoding a line received from a panel
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The line was not valid JSON
    #[error("Malformed JSON line {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The line decoded to JSON, but not to an object
    #[error("Expected a JSON object, got: {0}")]
    NotAnObject(String),

    /// The `events` field did not have the expected shape
    #[error("Malformed events payload: {0}")]
    MalformedEvents(#[source] serde_json::Error),

    /// One entry of the `events` list did not have the expected shape
    #[error("Malformed event #{index}: {source}")]
    MalformedEvent {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A key label carried no digits to identify the key
    #[error("Key label {0:?} has no key number")]
    MissingKeyNumber(String),

    /// A line grew past the framer limit without a line feed
    #[error("Line exceeded {limit} bytes without a terminator")]
    LineTooLong { limit: usize },
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
