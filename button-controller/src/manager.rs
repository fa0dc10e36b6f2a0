//! Connection manager
//!
//! Keeps one session per configured panel. A background task reconciles the
//! settings against the session registry on a fixed cadence, opening
//! sessions for slots that have none and closing sessions whose slot no
//! longer points at their IP. The same task follows transport pairing and
//! zone changes and asks the affected sessions to resync their LEDs.
//!
//! # Example
//!
//! ```rust,ignore
//! use button_controller::{ConnectionManager, ControllerConfig, Settings};
//! use zone_transport::TransportLink;
//!
//! let settings = Settings::load("settings.json")?;
//! let manager = ConnectionManager::start(ControllerConfig::default(), settings, TransportLink::new())?;
//!
//! let mut events = manager.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use zone_transport::{TransportLink, ZoneChange};

use crate::classifier::SequenceAllocator;
use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::event::ControllerEvent;
use crate::registry::{SessionInfo, SessionRegistry};
use crate::session::{DeviceSession, SessionCommand};
use crate::settings::Settings;
use crate::status::StatusSummary;

/// State shared between the manager task and every session
pub(crate) struct ControllerContext {
    pub config: ControllerConfig,
    pub settings: watch::Sender<Arc<Settings>>,
    pub link: TransportLink,
    pub registry: SessionRegistry,
    pub sequences: SequenceAllocator,
    events: broadcast::Sender<ControllerEvent>,
    last_status: Mutex<Option<StatusSummary>>,
    stopped: AtomicBool,
}

impl ControllerContext {
    /// Current settings snapshot
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.borrow().clone()
    }

    pub fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Recompute the status summary and announce it if it changed.
    ///
    /// Computing and announcing both happen under `last_status`, so the
    /// stored summary and the order of `StatusChanged` events always agree.
    /// Lock order is `last_status` then the registry.
    pub fn publish_status(&self) {
        let mut last = self.last_status.lock();
        let status = StatusSummary::compute(&self.settings(), &self.registry);
        if *last == Some(status) {
            return;
        }
        *last = Some(status);

        tracing::info!(
            configured = status.configured,
            connected = status.connected,
            initializing = status.initializing,
            "Panel status"
        );
        self.emit(ControllerEvent::StatusChanged(status));
    }

    /// Align live sessions with the current settings
    pub fn reconcile(self: &Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let settings = self.settings();

        let stale = self.registry.close_where(|ip, handle| {
            settings
                .device(handle.device_index)
                .map(|d| d.ip.trim())
                != Some(ip)
        });

        let mut opened = Vec::new();
        for device in settings.configured_devices() {
            let ip = device.ip.trim();
            let mut session_id = None;
            let inserted = self.registry.open_if_absent(ip, || {
                let id = self.registry.allocate_id();
                session_id = Some(id);
                let (session, mut handle) = DeviceSession::new(id, ip, device.index, self.clone());
                handle.task = Some(tokio::spawn(session.run()));
                handle
            });
            if let (true, Some(id)) = (inserted, session_id) {
                opened.push((id, ip.to_string(), device.index));
            }
        }

        for (session, ip, device_index) in &opened {
            tracing::debug!(%ip, device_index, %session, "Opening session");
            self.emit(ControllerEvent::SessionOpened {
                session: *session,
                ip: ip.clone(),
                device_index: *device_index,
            });
        }
        if stale > 0 || !opened.is_empty() {
            self.publish_status();
        }
    }

    /// Ask every session to resync its LED
    fn sync_all(&self) {
        self.registry
            .send_each(|_, _| Some(SessionCommand::SyncLed { forced: false }));
    }

    fn zone_changed(&self, change: &ZoneChange) {
        let settings = self.settings();
        tracing::trace!(zone = %change.zone(), "Zone changed");
        self.registry.send_each(|_, handle| {
            let bound = settings
                .device(handle.device_index)
                .and_then(|d| d.zone.as_ref())
                == Some(change.zone());
            bound.then_some(SessionCommand::SyncLed { forced: false })
        });
    }
}

enum ZoneFeed {
    Change(ZoneChange),
    Lagged(u64),
    Closed,
}

async fn next_zone_change(changes: &mut Option<broadcast::Receiver<ZoneChange>>) -> ZoneFeed {
    let Some(rx) = changes else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(change) => ZoneFeed::Change(change),
        Err(broadcast::error::RecvError::Lagged(n)) => ZoneFeed::Lagged(n),
        Err(broadcast::error::RecvError::Closed) => ZoneFeed::Closed,
    }
}

async fn run(ctx: Arc<ControllerContext>, stop: Arc<Notify>, rescan: Arc<Notify>) {
    let mut scan = tokio::time::interval(ctx.config.scan_interval);
    scan.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut pairing = ctx.link.watch();
    let mut changes = pairing
        .borrow_and_update()
        .as_ref()
        .map(|transport| transport.subscribe_zone_changes());

    tracing::debug!(interval = ?ctx.config.scan_interval, "Connection manager started");

    loop {
        tokio::select! {
            _ = stop.notified() => break,

            _ = scan.tick() => ctx.reconcile(),

            _ = rescan.notified() => ctx.reconcile(),

            changed = pairing.changed() => {
                if changed.is_err() {
                    break;
                }
                changes = pairing
                    .borrow_and_update()
                    .as_ref()
                    .map(|transport| transport.subscribe_zone_changes());
                tracing::debug!(paired = changes.is_some(), "Pairing changed, resyncing LEDs");
                ctx.sync_all();
            }

            feed = next_zone_change(&mut changes) => match feed {
                ZoneFeed::Change(change) => ctx.zone_changed(&change),
                ZoneFeed::Lagged(missed) => {
                    tracing::warn!(missed, "Zone change feed lagged, resyncing all LEDs");
                    ctx.sync_all();
                }
                ZoneFeed::Closed => {
                    tracing::debug!("Zone change feed closed");
                    changes = None;
                }
            },
        }
    }

    tracing::debug!("Connection manager stopped");
}

/// Owns the session registry and the reconciliation task.
///
/// Must be started from within a tokio runtime. Dropping the manager stops
/// scanning and closes every session; use [`shutdown`](Self::shutdown) to
/// also wait for them to finish.
pub struct ConnectionManager {
    ctx: Arc<ControllerContext>,
    stop: Arc<Notify>,
    rescan: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Validate configuration and start reconciling
    pub fn start(config: ControllerConfig, settings: Settings, link: TransportLink) -> Result<Self> {
        config.validate()?;
        settings.validate()?;

        let (events, _) = broadcast::channel(config.event_buffer_size);
        let (settings, _) = watch::channel(Arc::new(settings));
        let ctx = Arc::new(ControllerContext {
            config,
            settings,
            link,
            registry: SessionRegistry::new(),
            sequences: SequenceAllocator::new(),
            events,
            last_status: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        let stop = Arc::new(Notify::new());
        let rescan = Arc::new(Notify::new());
        let task = tokio::spawn(run(ctx.clone(), stop.clone(), rescan.clone()));

        tracing::info!(
            devices = ctx.settings().configured_devices().count(),
            port = ctx.config.device_port,
            "Button controller started"
        );

        Ok(Self {
            ctx,
            stop,
            rescan,
            task: Mutex::new(Some(task)),
        })
    }

    /// Run one reconciliation pass now
    pub fn reconcile(&self) {
        self.ctx.reconcile();
    }

    /// Replace the settings snapshot.
    ///
    /// Sessions whose slot changed are closed and reopened on the next
    /// pass, which is triggered immediately. Every live session resyncs its
    /// LED; a device whose colours changed gets a forced write so the new
    /// colour shows at once.
    pub fn apply_settings(&self, settings: Settings) -> Result<()> {
        if self.ctx.stopped.load(Ordering::Acquire) {
            return Err(ControllerError::ManagerStopped);
        }
        settings.validate()?;

        let settings = Arc::new(settings);
        let previous = self.ctx.settings.send_replace(settings.clone());
        tracing::info!(
            devices = settings.configured_devices().count(),
            long_press_timeout_ms = settings.long_press_timeout_ms,
            "Settings applied"
        );

        self.ctx.registry.send_each(|_, handle| {
            let before = previous.device(handle.device_index).map(|d| &d.leds);
            let after = settings.device(handle.device_index).map(|d| &d.leds);
            Some(SessionCommand::SyncLed {
                forced: before != after,
            })
        });
        self.rescan.notify_one();
        self.ctx.publish_status();
        Ok(())
    }

    /// Resync one panel's LED, optionally forcing the write
    pub fn refresh_led(&self, ip: &str, forced: bool) -> Result<()> {
        self.ctx.registry.send(ip, SessionCommand::SyncLed { forced })
    }

    /// Snapshots of every live session, ordered by slot
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.ctx.registry.infos()
    }

    pub fn has_session(&self, ip: &str) -> bool {
        self.ctx.registry.contains(ip)
    }

    /// Number of live or connecting sessions
    pub fn session_count(&self) -> usize {
        self.ctx.registry.len()
    }

    pub fn status(&self) -> StatusSummary {
        StatusSummary::compute(&self.ctx.settings(), &self.ctx.registry)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.ctx.events.subscribe()
    }

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<Settings> {
        self.ctx.settings()
    }

    /// Observe settings changes
    pub fn watch_settings(&self) -> watch::Receiver<Arc<Settings>> {
        self.ctx.settings.subscribe()
    }

    pub fn link(&self) -> &TransportLink {
        &self.ctx.link
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.ctx.config
    }

    /// Stop scanning, close every session and wait for them to finish
    pub async fn shutdown(&self) {
        self.stop_scanning();

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let sessions = self.ctx.registry.close_all();
        let count = sessions.len();
        for session in sessions {
            let _ = session.await;
        }
        tracing::info!(sessions = count, "Button controller shut down");
    }

    fn stop_scanning(&self) {
        self.ctx.stopped.store(true, Ordering::Release);
        self.stop.notify_one();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop_scanning();
        self.ctx.registry.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DeviceSettings;
    use std::time::Duration;

    fn quiet_config() -> ControllerConfig {
        // Port 1 on loopback refuses connections straight away
        ControllerConfig::new()
            .with_device_port(1)
            .with_scan_interval(Duration::from_millis(20))
            .with_connect_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_settings() {
        let settings = Settings {
            seek_amount: 0,
            ..Default::default()
        };
        let result = ConnectionManager::start(quiet_config(), settings, TransportLink::new());
        assert!(matches!(result, Err(ControllerError::Config(_))));
    }

    #[tokio::test]
    async fn test_status_without_devices() {
        let manager =
            ConnectionManager::start(quiet_config(), Settings::default(), TransportLink::new())
                .unwrap();
        assert!(!manager.status().is_configured());
        assert!(manager.sessions().is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_apply_settings_after_shutdown() {
        let manager =
            ConnectionManager::start(quiet_config(), Settings::default(), TransportLink::new())
                .unwrap();
        manager.shutdown().await;

        let settings = Settings::new(vec![DeviceSettings::new(1, "127.0.0.1")]);
        assert!(matches!(
            manager.apply_settings(settings),
            Err(ControllerError::ManagerStopped)
        ));
    }

    #[tokio::test]
    async fn test_refresh_unknown_session() {
        let manager =
            ConnectionManager::start(quiet_config(), Settings::default(), TransportLink::new())
                .unwrap();
        assert!(matches!(
            manager.refresh_led("10.0.0.9", true),
            Err(ControllerError::SessionNotFound(_))
        ));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_status_publishes_settle_on_latest() {
        let manager =
            ConnectionManager::start(quiet_config(), Settings::default(), TransportLink::new())
                .unwrap();
        manager.shutdown().await;
        let mut events = manager.subscribe();

        let writers: Vec<_> = (1..=8usize)
            .map(|n| {
                let ctx = manager.ctx.clone();
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let devices = (1..=(n + round) % 4)
                            .map(|i| DeviceSettings::new(i, format!("10.0.0.{i}")))
                            .collect();
                        ctx.settings.send_replace(Arc::new(Settings::new(devices)));
                        ctx.publish_status();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let current = manager.status();
        assert_eq!(*manager.ctx.last_status.lock(), Some(current));

        let mut last_announced = None;
        loop {
            match events.try_recv() {
                Ok(ControllerEvent::StatusChanged(status)) => last_announced = Some(status),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        if let Some(status) = last_announced {
            assert_eq!(status, current);
        }
    }

    #[tokio::test]
    async fn test_failed_connect_is_removed_and_retried() {
        let settings = Settings::new(vec![DeviceSettings::new(1, "127.0.0.1")]);
        let manager = ConnectionManager::start(quiet_config(), settings, TransportLink::new()).unwrap();
        let mut events = manager.subscribe();

        let mut opened = 0;
        let mut closed = 0;
        while opened < 2 || closed < 1 {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Ok(ControllerEvent::SessionOpened { .. })) => {
                    assert_eq!(opened, closed, "a second session opened before the first closed");
                    opened += 1;
                }
                Ok(Ok(ControllerEvent::SessionClosed { reason, .. })) => {
                    assert!(matches!(reason, crate::event::CloseReason::ConnectFailed(_)));
                    closed += 1;
                }
                Ok(Ok(_)) => {}
                other => panic!("unexpected: {other:?}"),
            }
        }
        manager.shutdown().await;
        assert!(!manager.has_session("127.0.0.1"));
    }
}
