//! Per-panel session actor
//!
//! Each session runs as one tokio task that owns the socket, the key
//! classifier, the LED synchroniser and the long-press timers. Nothing else
//! touches that state; the manager talks to a session only through its
//! command queue and shutdown signal.
//!
//! Teardown order matters: timers are aborted first, then the registry entry
//! is removed, then the close is announced. Once the entry is gone the next
//! scan may open a fresh session for the same IP.

use std::collections::HashMap;
use std::sync::Arc;

use panel_protocol::{decode_line, InboundLine, KeyId, LineFramer, Outbound, PanelMessage};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

use crate::classifier::{ButtonClassifier, ButtonEvent, LongPressTimer, Transition};
use crate::dispatcher::{ActionDispatcher, DispatchOutcome};
use crate::error::ControllerError;
use crate::event::{CloseReason, ControllerEvent};
use crate::led::LedSynchronizer;
use crate::manager::ControllerContext;
use crate::registry::{SessionHandle, SessionId, SessionInfo, SessionPhase};

/// Messages a session accepts from the manager and its own timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionCommand {
    /// Recompute the LED; `forced` writes even if the state is unchanged
    SyncLed { forced: bool },
    /// A long-press timeout elapsed
    LongPressElapsed(LongPressTimer),
}

pub(crate) struct DeviceSession {
    id: SessionId,
    ip: String,
    device_index: usize,
    ctx: Arc<ControllerContext>,
    commands: mpsc::Receiver<SessionCommand>,
    timer_tx: mpsc::WeakSender<SessionCommand>,
    shutdown: Arc<Notify>,
    info: Arc<RwLock<SessionInfo>>,
    classifier: ButtonClassifier,
    led: LedSynchronizer,
    dispatcher: ActionDispatcher,
    timers: HashMap<KeyId, (u64, JoinHandle<()>)>,
    identified: bool,
}

impl DeviceSession {
    /// Build a session and the registry handle that controls it
    pub fn new(
        id: SessionId,
        ip: &str,
        device_index: usize,
        ctx: Arc<ControllerContext>,
    ) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::channel(ctx.config.command_buffer_size);
        let shutdown = Arc::new(Notify::new());
        let info = Arc::new(RwLock::new(SessionInfo::new(id, ip, device_index)));

        let session = Self {
            id,
            ip: ip.to_string(),
            device_index,
            classifier: ButtonClassifier::new(id, ctx.sequences.clone()),
            dispatcher: ActionDispatcher::new(ctx.link.clone())
                .with_timeout(ctx.config.transport_timeout),
            ctx,
            commands,
            timer_tx: tx.downgrade(),
            shutdown: shutdown.clone(),
            info: info.clone(),
            led: LedSynchronizer::new(),
            timers: HashMap::new(),
            identified: false,
        };
        let handle = SessionHandle {
            id,
            device_index,
            commands: tx,
            shutdown,
            info,
            task: None,
        };
        (session, handle)
    }

    pub async fn run(mut self) {
        let reason = self.serve().await;
        self.teardown(reason);
    }

    async fn serve(&mut self) -> CloseReason {
        let port = self.ctx.config.device_port;
        let connect_timeout = self.ctx.config.connect_timeout;
        let connect = timeout(connect_timeout, TcpStream::connect((self.ip.as_str(), port)));

        let stream = tokio::select! {
            _ = self.shutdown.notified() => return CloseReason::Closed,
            result = connect => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return CloseReason::ConnectFailed(e.to_string()),
                Err(_) => {
                    let e = ControllerError::ConnectTimeout {
                        ip: self.ip.clone(),
                        timeout: connect_timeout,
                    };
                    return CloseReason::ConnectFailed(e.to_string());
                }
            },
        };
        // LED writes are tiny
        let _ = stream.set_nodelay(true);

        tracing::info!(ip = %self.ip, device_index = self.device_index, "Panel connected");
        self.set_phase(SessionPhase::AwaitingIdentity);
        self.ctx.emit(ControllerEvent::SessionConnected {
            session: self.id,
            ip: self.ip.clone(),
        });
        self.ctx.publish_status();

        let (mut reader, mut writer) = stream.into_split();
        let mut framer = LineFramer::new();

        if let Err(e) = self.sync_led(&mut writer, false).await {
            return CloseReason::Io(e.to_string());
        }

        let period = self.ctx.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => return CloseReason::Closed,

                read = reader.read_buf(framer.buffer_mut()) => match read {
                    Ok(0) => return CloseReason::EndOfStream,
                    Ok(_) => self.drain_lines(&mut framer).await,
                    Err(e) => return CloseReason::Io(e.to_string()),
                },

                _ = keepalive.tick() => {
                    tracing::trace!(ip = %self.ip, "Keep-alive");
                    if let Err(e) = writer.write_all(&Outbound::QueryLed.to_bytes()).await {
                        return CloseReason::Io(e.to_string());
                    }
                }

                Some(command) = self.commands.recv() => {
                    if let Err(e) = self.handle_command(command, &mut writer).await {
                        return CloseReason::Io(e.to_string());
                    }
                }
            }
        }
    }

    async fn handle_command(
        &mut self,
        command: SessionCommand,
        writer: &mut OwnedWriteHalf,
    ) -> std::io::Result<()> {
        match command {
            SessionCommand::SyncLed { forced } => self.sync_led(writer, forced).await,
            SessionCommand::LongPressElapsed(timer) => {
                if matches!(self.timers.get(&timer.key), Some((seq, _)) if *seq == timer.seq) {
                    self.timers.remove(&timer.key);
                }
                let transition = self.classifier.timer_fired(timer);
                self.apply(transition).await;
                Ok(())
            }
        }
    }

    async fn drain_lines(&mut self, framer: &mut LineFramer) {
        loop {
            match framer.next_line() {
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => break,
                Err(e) => tracing::warn!(ip = %self.ip, error = %e, "Discarding buffered input"),
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        match decode_line(line) {
            Ok(InboundLine::Blank) | Ok(InboundLine::Comment(_)) => {}
            Ok(InboundLine::LedEcho(value)) => {
                tracing::trace!(ip = %self.ip, value = %value, "LED echo");
                self.ctx.emit(ControllerEvent::LedFeedback {
                    ip: self.ip.clone(),
                    value,
                });
            }
            Ok(InboundLine::Message(message)) => self.handle_message(message).await,
            Err(e) => tracing::warn!(ip = %self.ip, error = %e, "Dropping malformed line"),
        }
    }

    async fn handle_message(&mut self, message: PanelMessage) {
        if !self.identified {
            let identity = message.identity();
            tracing::info!(
                ip = %self.ip,
                device_id = %identity.device_id,
                model = %identity.model,
                version = %identity.version,
                keys = identity.keys.len(),
                "Panel identified"
            );
            self.identified = true;
            {
                let mut info = self.info.write();
                info.identity = Some(identity.clone());
                info.phase = SessionPhase::Ready;
            }
            self.ctx.emit(ControllerEvent::IdentityReceived {
                session: self.id,
                ip: self.ip.clone(),
                identity,
            });
            self.ctx.publish_status();
            return;
        }

        let events = match message.events() {
            Ok(Some(events)) => events,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(ip = %self.ip, error = %e, "Dropping malformed events");
                return;
            }
        };

        for event in events {
            match event.and_then(|event| event.signal()) {
                Ok(signal) => {
                    let transition = self.classifier.signal(signal);
                    self.apply(transition).await;
                }
                Err(e) => tracing::warn!(ip = %self.ip, error = %e, "Ignoring key event"),
            }
        }
    }

    async fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Schedule(timer) => self.arm_timer(timer),
            Transition::Emit(event) => self.on_button(event).await,
            Transition::Ignored => {}
        }
    }

    fn arm_timer(&mut self, timer: LongPressTimer) {
        let delay = self.ctx.settings().long_press_timeout();
        let tx = self.timer_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SessionCommand::LongPressElapsed(timer)).await;
            }
        });
        if let Some((_, previous)) = self.timers.insert(timer.key, (timer.seq, handle)) {
            previous.abort();
        }
    }

    async fn on_button(&mut self, event: ButtonEvent) {
        if let Some((_, timer)) = self.timers.remove(&event.key) {
            timer.abort();
        }

        let settings = self.ctx.settings();
        let device = settings.device(self.device_index);
        let action = device
            .map(|d| d.action_for(event.key, event.kind))
            .unwrap_or_default();

        tracing::info!(
            ip = %self.ip,
            key = %event.key,
            kind = %event.kind,
            %action,
            "Button event"
        );
        self.ctx.emit(ControllerEvent::Button {
            ip: self.ip.clone(),
            device_index: self.device_index,
            event,
            action,
        });

        let zone = device.and_then(|d| d.zone.as_ref());
        if let DispatchOutcome::Skipped(reason) = self.dispatcher.dispatch(action, zone, &settings).await {
            tracing::debug!(ip = %self.ip, %action, %reason, "Action skipped");
        }
    }

    async fn sync_led(&mut self, writer: &mut OwnedWriteHalf, forced: bool) -> std::io::Result<()> {
        let settings = self.ctx.settings();
        let Some(device) = settings.device(self.device_index) else {
            return Ok(());
        };

        let playback = match (&device.zone, self.ctx.link.current()) {
            (Some(zone), Some(transport)) => {
                let limit = self.ctx.config.transport_timeout;
                match timeout(limit, transport.resolve_zone(zone)).await {
                    Ok(snapshot) => snapshot.map(|z| z.state),
                    Err(_) => {
                        // Keep whatever the panel shows until the next sync
                        tracing::warn!(ip = %self.ip, %zone, ?limit, "Zone lookup timed out");
                        return Ok(());
                    }
                }
            }
            _ => None,
        };

        let Some(color) = self.led.sync(&device.leds, playback, forced) else {
            return Ok(());
        };

        tracing::debug!(ip = %self.ip, color = %color, forced, "Writing LED");
        writer
            .write_all(&Outbound::SetLed(color.to_string()).to_bytes())
            .await?;
        self.info.write().led = self.led.last();
        self.ctx.emit(ControllerEvent::LedWritten {
            ip: self.ip.clone(),
            color,
        });
        Ok(())
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.info.write().phase = phase;
    }

    fn teardown(&mut self, reason: CloseReason) {
        for (_, (_, timer)) in self.timers.drain() {
            timer.abort();
        }
        self.ctx.registry.remove(&self.ip, self.id);

        match &reason {
            CloseReason::Closed => {
                tracing::info!(ip = %self.ip, session = %self.id, "Session closed")
            }
            // Retried on every scan tick
            CloseReason::ConnectFailed(e) => {
                tracing::debug!(ip = %self.ip, session = %self.id, error = %e, "Connect failed")
            }
            other => {
                tracing::warn!(ip = %self.ip, session = %self.id, reason = %other, "Session ended")
            }
        }
        self.ctx.emit(ControllerEvent::SessionClosed {
            session: self.id,
            ip: self.ip.clone(),
            reason,
        });
        self.ctx.publish_status();
    }
}
