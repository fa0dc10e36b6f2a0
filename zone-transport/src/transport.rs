//! The playback transport capability

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::zone::{ZoneChange, ZoneRef, ZoneSnapshot};

/// Transport control commands addressed to a single zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    PlayPause,
    Stop,
    Next,
    Previous,
}

/// How a seek amount is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekMode {
    /// Seconds relative to the current position
    Relative,
}

/// Mute operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuteMode {
    Toggle,
}

/// How a volume amount is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMode {
    /// Steps relative to the current volume
    RelativeStep,
}

/// Playback control service consumed by the controller
///
/// Implementations own the wire protocol to whatever actually plays music.
/// The controller only ever talks to it through this trait, and only while
/// it is paired (see [`TransportLink`](crate::TransportLink)).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to zone change notifications
    fn subscribe_zone_changes(&self) -> broadcast::Receiver<ZoneChange>;

    /// Look up the current state of a zone, `None` if it is unknown
    async fn resolve_zone(&self, zone: &ZoneRef) -> Option<ZoneSnapshot>;

    /// Issue a transport control command
    async fn control(&self, zone: &ZoneRef, command: ControlCommand) -> Result<()>;

    /// Move the playback position
    async fn seek(&self, zone: &ZoneRef, mode: SeekMode, amount: i32) -> Result<()>;

    /// Pause every zone
    async fn pause_all(&self) -> Result<()>;

    /// Change the mute state
    async fn mute(&self, zone: &ZoneRef, mode: MuteMode) -> Result<()>;

    /// Change the volume
    async fn change_volume(&self, zone: &ZoneRef, mode: VolumeMode, amount: i32) -> Result<()>;
}
