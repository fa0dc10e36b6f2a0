//! Zone identity and playback state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a playback zone as stored in settings
///
/// Opaque to the controller; only the transport knows how to resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneRef(String);

impl ZoneRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the reference as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ZoneRef {
    fn from(s: &str) -> Self {
        ZoneRef::new(s)
    }
}

impl From<String> for ZoneRef {
    fn from(s: String) -> Self {
        ZoneRef::new(s)
    }
}

/// Current playback state of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Currently playing audio
    Playing,
    /// Buffering before playback starts
    Loading,
    /// Playback is paused
    Paused,
    /// Playback is stopped
    #[default]
    Stopped,
}

impl PlaybackState {
    /// Parse from a transport state string
    ///
    /// Accepts `playing`, `loading`, `paused` and `stopped` in any case.
    /// Anything unrecognised is treated as stopped.
    pub fn from_transport_state(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "playing" => PlaybackState::Playing,
            "loading" => PlaybackState::Loading,
            "paused" => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Playing => "playing",
            PlaybackState::Loading => "loading",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub zone: ZoneRef,
    pub display_name: String,
    pub state: PlaybackState,
}

impl ZoneSnapshot {
    pub fn new(zone: impl Into<ZoneRef>, display_name: impl Into<String>, state: PlaybackState) -> Self {
        Self {
            zone: zone.into(),
            display_name: display_name.into(),
            state,
        }
    }
}

/// Notification pushed by the transport when zones change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneChange {
    /// A zone appeared or its state changed
    Changed(ZoneSnapshot),
    /// A zone went away
    Removed(ZoneRef),
}

impl ZoneChange {
    /// The zone this notification is about
    pub fn zone(&self) -> &ZoneRef {
        match self {
            ZoneChange::Changed(snapshot) => &snapshot.zone,
            ZoneChange::Removed(zone) => zone,
        }
    }
}
