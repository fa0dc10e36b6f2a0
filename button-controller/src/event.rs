//! Events published by the controller

use panel_protocol::DeviceIdentity;

use crate::classifier::ButtonEvent;
use crate::registry::SessionId;
use crate::settings::{Action, LedColor};
use crate::status::StatusSummary;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Removed from settings, moved to another slot, or manager shutdown
    Closed,
    /// The panel closed the connection
    EndOfStream,
    /// The connection could not be established
    ConnectFailed(String),
    /// Reading from or writing to the socket failed
    Io(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Closed => write!(f, "closed"),
            CloseReason::EndOfStream => write!(f, "end of stream"),
            CloseReason::ConnectFailed(e) => write!(f, "connect failed: {}", e),
            CloseReason::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

/// Notifications about sessions, buttons and LEDs.
///
/// Delivered on a broadcast channel from
/// [`ConnectionManager::subscribe`](crate::ConnectionManager::subscribe).
/// Slow subscribers may miss events; nothing in the controller depends on
/// them being read.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A connection attempt started for a configured slot
    SessionOpened {
        session: SessionId,
        ip: String,
        device_index: usize,
    },
    /// TCP connection established
    SessionConnected { session: SessionId, ip: String },
    /// The panel sent its identity handshake
    IdentityReceived {
        session: SessionId,
        ip: String,
        identity: DeviceIdentity,
    },
    /// A key was pressed or long-pressed
    Button {
        ip: String,
        device_index: usize,
        event: ButtonEvent,
        action: Action,
    },
    /// An LED colour was written
    LedWritten { ip: String, color: LedColor },
    /// The panel echoed its LED value (`led=...`)
    LedFeedback { ip: String, value: String },
    /// A session was torn down and removed
    SessionClosed {
        session: SessionId,
        ip: String,
        reason: CloseReason,
    },
    /// Configured/connected counts changed
    StatusChanged(StatusSummary),
}
