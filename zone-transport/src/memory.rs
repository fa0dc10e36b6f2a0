//! In-process transport
//!
//! Holds a set of zones in memory, records every call made against it and
//! applies the obvious state effects (play/pause toggles, stop stops). Used by
//! tests and by the daemon's simulation mode.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::error::{Result, TransportError};
use crate::transport::{ControlCommand, MuteMode, SeekMode, Transport, VolumeMode};
use crate::zone::{PlaybackState, ZoneChange, ZoneRef, ZoneSnapshot};

/// One call received by a [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Control { zone: ZoneRef, command: ControlCommand },
    Seek { zone: ZoneRef, mode: SeekMode, amount: i32 },
    PauseAll,
    Mute { zone: ZoneRef, mode: MuteMode },
    ChangeVolume { zone: ZoneRef, mode: VolumeMode, amount: i32 },
}

pub struct MemoryTransport {
    zones: RwLock<BTreeMap<ZoneRef, ZoneSnapshot>>,
    calls: Mutex<Vec<TransportCall>>,
    changes: broadcast::Sender<ZoneChange>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            zones: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// Builder-style zone registration
    pub fn with_zone(self, snapshot: ZoneSnapshot) -> Self {
        self.zones.write().insert(snapshot.zone.clone(), snapshot);
        self
    }

    /// Add or replace a zone and notify subscribers
    pub fn upsert_zone(&self, snapshot: ZoneSnapshot) {
        self.zones.write().insert(snapshot.zone.clone(), snapshot.clone());
        self.publish(ZoneChange::Changed(snapshot));
    }

    /// Change the playback state of a known zone and notify subscribers.
    ///
    /// Returns `false` if the zone does not exist.
    pub fn set_state(&self, zone: &ZoneRef, state: PlaybackState) -> bool {
        let snapshot = {
            let mut zones = self.zones.write();
            match zones.get_mut(zone) {
                Some(snapshot) => {
                    snapshot.state = state;
                    snapshot.clone()
                }
                None => return false,
            }
        };
        self.publish(ZoneChange::Changed(snapshot));
        true
    }

    /// Remove a zone and notify subscribers
    pub fn remove_zone(&self, zone: &ZoneRef) -> Option<ZoneSnapshot> {
        let removed = self.zones.write().remove(zone);
        if removed.is_some() {
            self.publish(ZoneChange::Removed(zone.clone()));
        }
        removed
    }

    /// All calls received so far, oldest first
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn publish(&self, change: ZoneChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }

    fn record(&self, call: TransportCall) {
        tracing::debug!(?call, "Transport call");
        self.calls.lock().push(call);
    }

    fn require_zone(&self, zone: &ZoneRef) -> Result<PlaybackState> {
        self.zones
            .read()
            .get(zone)
            .map(|z| z.state)
            .ok_or_else(|| TransportError::ZoneNotFound(zone.clone()))
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn subscribe_zone_changes(&self) -> broadcast::Receiver<ZoneChange> {
        self.changes.subscribe()
    }

    async fn resolve_zone(&self, zone: &ZoneRef) -> Option<ZoneSnapshot> {
        self.zones.read().get(zone).cloned()
    }

    async fn control(&self, zone: &ZoneRef, command: ControlCommand) -> Result<()> {
        let current = self.require_zone(zone)?;
        self.record(TransportCall::Control {
            zone: zone.clone(),
            command,
        });

        let next = match command {
            ControlCommand::PlayPause if current == PlaybackState::Playing => PlaybackState::Paused,
            ControlCommand::PlayPause => PlaybackState::Playing,
            ControlCommand::Stop => PlaybackState::Stopped,
            ControlCommand::Next | ControlCommand::Previous => return Ok(()),
        };
        self.set_state(zone, next);
        Ok(())
    }

    async fn seek(&self, zone: &ZoneRef, mode: SeekMode, amount: i32) -> Result<()> {
        self.require_zone(zone)?;
        self.record(TransportCall::Seek {
            zone: zone.clone(),
            mode,
            amount,
        });
        Ok(())
    }

    async fn pause_all(&self) -> Result<()> {
        self.record(TransportCall::PauseAll);

        let playing: Vec<ZoneRef> = self
            .zones
            .read()
            .values()
            .filter(|z| matches!(z.state, PlaybackState::Playing | PlaybackState::Loading))
            .map(|z| z.zone.clone())
            .collect();
        for zone in playing {
            self.set_state(&zone, PlaybackState::Paused);
        }
        Ok(())
    }

    async fn mute(&self, zone: &ZoneRef, mode: MuteMode) -> Result<()> {
        self.require_zone(zone)?;
        self.record(TransportCall::Mute {
            zone: zone.clone(),
            mode,
        });
        Ok(())
    }

    async fn change_volume(&self, zone: &ZoneRef, mode: VolumeMode, amount: i32) -> Result<()> {
        self.require_zone(zone)?;
        self.record(TransportCall::ChangeVolume {
            zone: zone.clone(),
            mode,
            amount,
        });
        Ok(())
    }
}
