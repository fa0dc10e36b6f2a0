//! Maps key actions onto transport calls

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use zone_transport::{
    ControlCommand, MuteMode, SeekMode, Transport, TransportError, TransportLink, VolumeMode,
    ZoneRef,
};

use crate::settings::{Action, Settings};

/// A single call against the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    Control(ControlCommand),
    Seek(i32),
    PauseAll,
    Mute,
    Volume(i32),
}

impl TransportRequest {
    /// Resolve an action, with seek and volume amounts taken from `settings`.
    ///
    /// `Action::None` has no request.
    pub fn for_action(action: Action, settings: &Settings) -> Option<Self> {
        let seek = i32::try_from(settings.seek_amount).unwrap_or(i32::MAX);
        let step = i32::try_from(settings.volume_step).unwrap_or(i32::MAX);

        let request = match action {
            Action::TogglePlay => Self::Control(ControlCommand::PlayPause),
            Action::Stop => Self::Control(ControlCommand::Stop),
            Action::Next => Self::Control(ControlCommand::Next),
            Action::Previous => Self::Control(ControlCommand::Previous),
            Action::SeekFwd => Self::Seek(seek),
            Action::SeekBack => Self::Seek(-seek),
            Action::PauseAll => Self::PauseAll,
            Action::ToggleMute => Self::Mute,
            Action::VolumeUp => Self::Volume(step),
            Action::VolumeDown => Self::Volume(-step),
            Action::None => return None,
        };
        Some(request)
    }

    /// Whether the request addresses a single zone
    pub fn needs_zone(&self) -> bool {
        !matches!(self, Self::PauseAll)
    }

    async fn send(&self, transport: &dyn Transport, zone: Option<&ZoneRef>) -> zone_transport::Result<()> {
        match (self, zone) {
            (Self::PauseAll, _) => transport.pause_all().await,
            (_, None) => Err(TransportError::Rejected(format!("{self:?} needs a zone"))),
            (Self::Control(command), Some(zone)) => transport.control(zone, *command).await,
            (Self::Seek(amount), Some(zone)) => {
                transport.seek(zone, SeekMode::Relative, *amount).await
            }
            (Self::Mute, Some(zone)) => transport.mute(zone, MuteMode::Toggle).await,
            (Self::Volume(amount), Some(zone)) => {
                transport
                    .change_volume(zone, VolumeMode::RelativeStep, *amount)
                    .await
            }
        }
    }
}

/// Why an action produced no transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAction,
    Unpaired,
    Unbound,
    ZoneUnresolved,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NoAction => "no action bound",
            SkipReason::Unpaired => "transport not paired",
            SkipReason::Unbound => "no zone bound",
            SkipReason::ZoneUnresolved => "zone not found",
        })
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Sent(TransportRequest),
    Skipped(SkipReason),
    Failed(TransportError),
}

/// Default bound on one transport call
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Issues key actions against whatever transport is currently paired.
///
/// Dispatch is best effort: with no transport paired, no zone bound, or a
/// zone the transport does not know, the action is skipped rather than
/// reported as an error. Every transport call is bounded by the dispatcher's
/// timeout so a stalled service cannot hold up the session.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    link: TransportLink,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(link: TransportLink) -> Self {
        Self {
            link,
            timeout: DEFAULT_TRANSPORT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn dispatch(
        &self,
        action: Action,
        zone: Option<&ZoneRef>,
        settings: &Settings,
    ) -> DispatchOutcome {
        let Some(request) = TransportRequest::for_action(action, settings) else {
            return DispatchOutcome::Skipped(SkipReason::NoAction);
        };
        let Some(transport) = self.link.current() else {
            return DispatchOutcome::Skipped(SkipReason::Unpaired);
        };

        let target = if request.needs_zone() {
            let Some(zone) = zone else {
                return DispatchOutcome::Skipped(SkipReason::Unbound);
            };
            match self.bounded(async { Ok(transport.resolve_zone(zone).await) }).await {
                Ok(Some(_)) => Some(zone),
                Ok(None) => return DispatchOutcome::Skipped(SkipReason::ZoneUnresolved),
                Err(e) => return self.failed(action, e),
            }
        } else {
            None
        };

        match self.bounded(request.send(transport.as_ref(), target)).await {
            Ok(()) => {
                tracing::debug!(%action, ?request, "Action dispatched");
                DispatchOutcome::Sent(request)
            }
            Err(e) => self.failed(action, e),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = zone_transport::Result<T>>,
    ) -> zone_transport::Result<T> {
        timeout(self.timeout, call)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.timeout)))
    }

    fn failed(&self, action: Action, error: TransportError) -> DispatchOutcome {
        tracing::warn!(%action, error = %error, "Action failed");
        DispatchOutcome::Failed(error)
    }
}
