//! Live session registry, keyed by panel IP
//!
//! The registry is the only place that decides whether an IP has a session.
//! Insertion happens under the lock only when the IP is absent, and a session
//! removes its own entry (matched by [`SessionId`]) as the last step of its
//! teardown. Together these keep at most one session per IP at any time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use panel_protocol::DeviceIdentity;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{ControllerError, Result};
use crate::led::LedState;
use crate::session::SessionCommand;

/// Unique identifier for one session lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// TCP connect in progress
    Connecting,
    /// Connected, waiting for the identity handshake
    AwaitingIdentity,
    /// Identity received, events are being processed
    Ready,
}

/// Snapshot of one session, for status and settings views
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub ip: String,
    pub device_index: usize,
    pub phase: SessionPhase,
    pub identity: Option<DeviceIdentity>,
    pub led: Option<LedState>,
}

impl SessionInfo {
    pub fn new(id: SessionId, ip: impl Into<String>, device_index: usize) -> Self {
        Self {
            id,
            ip: ip.into(),
            device_index,
            phase: SessionPhase::Connecting,
            identity: None,
            led: None,
        }
    }
}

/// Registry-side handle to a running session
pub(crate) struct SessionHandle {
    pub id: SessionId,
    pub device_index: usize,
    pub commands: mpsc::Sender<SessionCommand>,
    pub shutdown: Arc<Notify>,
    pub info: Arc<RwLock<SessionInfo>>,
    pub task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Ask the session to tear itself down
    pub fn close(&self) {
        // notify_one keeps a permit if the session is not waiting yet
        self.shutdown.notify_one();
    }

    /// Queue a command without blocking.
    ///
    /// A full queue defers an LED sync to a background send instead of
    /// dropping it, so the panel cannot be left showing a stale colour.
    fn send(&self, ip: &str, command: SessionCommand) -> bool {
        let command = match self.commands.try_send(command) {
            Ok(()) => return true,
            Err(TrySendError::Full(command @ SessionCommand::SyncLed { .. })) => command,
            Err(e) => {
                tracing::debug!(ip, session = %self.id, error = %e, "Session command dropped");
                return false;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(ip, session = %self.id, "Session queue full, deferring LED sync");
                let commands = self.commands.clone();
                runtime.spawn(async move {
                    let _ = commands.send(command).await;
                });
                true
            }
            Err(_) => {
                tracing::debug!(ip, session = %self.id, "Session queue full, LED sync dropped");
                false
            }
        }
    }
}

pub(crate) struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert the handle built by `open` unless `ip` already has a session.
    ///
    /// `open` runs under the registry lock and must not call back into the
    /// registry.
    pub fn open_if_absent(&self, ip: &str, open: impl FnOnce() -> SessionHandle) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(ip) {
            return false;
        }
        sessions.insert(ip.to_string(), open());
        true
    }

    /// Remove the entry for `ip` if it still belongs to session `id`
    pub fn remove(&self, ip: &str, id: SessionId) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(ip) {
            Some(handle) if handle.id == id => {
                sessions.remove(ip);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.sessions.lock().contains_key(ip)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Phase of the session for `ip`, if it belongs to slot `device_index`
    pub fn phase_for(&self, ip: &str, device_index: usize) -> Option<SessionPhase> {
        self.sessions
            .lock()
            .get(ip)
            .filter(|h| h.device_index == device_index)
            .map(|h| h.info.read().phase)
    }

    pub fn infos(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .lock()
            .values()
            .map(|h| h.info.read().clone())
            .collect();
        infos.sort_by_key(|info| info.device_index);
        infos
    }

    /// Queue a command on one session
    pub fn send(&self, ip: &str, command: SessionCommand) -> Result<()> {
        let sessions = self.sessions.lock();
        let handle = sessions
            .get(ip)
            .ok_or_else(|| ControllerError::SessionNotFound(ip.to_string()))?;
        handle.send(ip, command);
        Ok(())
    }

    /// Queue the command chosen by `command` on every session it returns one for
    pub fn send_each(&self, command: impl Fn(&str, &SessionHandle) -> Option<SessionCommand>) {
        for (ip, handle) in self.sessions.lock().iter() {
            if let Some(command) = command(ip, handle) {
                handle.send(ip, command);
            }
        }
    }

    /// Close every session matching `predicate`, returning how many were asked
    pub fn close_where(&self, predicate: impl Fn(&str, &SessionHandle) -> bool) -> usize {
        let sessions = self.sessions.lock();
        let mut closed = 0;
        for (ip, handle) in sessions.iter() {
            if predicate(ip, handle) {
                tracing::debug!(ip, session = %handle.id, "Closing session");
                handle.close();
                closed += 1;
            }
        }
        closed
    }

    /// Close every session and hand back their tasks for joining
    pub fn close_all(&self) -> Vec<JoinHandle<()>> {
        let mut sessions = self.sessions.lock();
        sessions
            .values_mut()
            .filter_map(|handle| {
                handle.close();
                handle.task.take()
            })
            .collect()
    }
}
