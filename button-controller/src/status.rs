use serde::Serialize;

use crate::registry::{SessionPhase, SessionRegistry};
use crate::settings::Settings;

/// Connection counts over the configured panel slots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    /// Slots with an IP address
    pub configured: usize,
    /// Slots whose panel has completed the identity handshake
    pub connected: usize,
    /// Slots with a session that is still connecting or awaiting identity
    pub initializing: usize,
}

impl StatusSummary {
    pub(crate) fn compute(settings: &Settings, registry: &SessionRegistry) -> Self {
        let mut summary = StatusSummary::default();
        for device in settings.configured_devices() {
            summary.configured += 1;
            match registry.phase_for(device.ip.trim(), device.index) {
                Some(SessionPhase::Ready) => summary.connected += 1,
                Some(SessionPhase::Connecting | SessionPhase::AwaitingIdentity) => {
                    summary.initializing += 1
                }
                None => {}
            }
        }
        summary
    }

    pub fn is_configured(&self) -> bool {
        self.configured > 0
    }

    /// Configured slots with no live session
    pub fn disconnected(&self) -> usize {
        self.configured - self.connected - self.initializing
    }
}
