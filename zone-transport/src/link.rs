//! Paired/unpaired state of the transport

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::transport::Transport;

/// Shared handle to the currently paired transport, if any
pub type PairedTransport = Option<Arc<dyn Transport>>;

/// Tracks whether a controlling service is attached.
///
/// Pairing happens outside the controller; whoever completes the handshake
/// calls [`pair`](Self::pair), and [`unpair`](Self::unpair) when the service
/// goes away. Cloning the link shares the same state.
#[derive(Clone)]
pub struct TransportLink {
    tx: Arc<watch::Sender<PairedTransport>>,
}

impl TransportLink {
    /// Create an unpaired link
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a link that is already paired with `transport`
    pub fn paired(transport: Arc<dyn Transport>) -> Self {
        let link = Self::new();
        link.pair(transport);
        link
    }

    /// Attach a transport, replacing any previous one
    pub fn pair(&self, transport: Arc<dyn Transport>) {
        self.tx.send_replace(Some(transport));
        tracing::info!("Transport paired");
    }

    /// Detach the current transport
    pub fn unpair(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("Transport unpaired");
        }
    }

    /// The paired transport, or `None` while unpaired
    pub fn current(&self) -> PairedTransport {
        self.tx.borrow().clone()
    }

    pub fn is_paired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Observe pairing changes
    pub fn watch(&self) -> watch::Receiver<PairedTransport> {
        self.tx.subscribe()
    }
}

impl Default for TransportLink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportLink")
            .field("paired", &self.is_paired())
            .finish()
    }
}
