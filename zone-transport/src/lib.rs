//! Playback transport capability
//!
//! The button controller does not speak to any music service directly. It is
//! handed something that implements [`Transport`] once a controlling service
//! has been paired, and degrades to no-ops and default LED colours while
//! nothing is paired.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zone_transport::{MemoryTransport, PlaybackState, TransportLink, ZoneSnapshot};
//!
//! let transport = Arc::new(
//!     MemoryTransport::new().with_zone(ZoneSnapshot::new("z1", "Kitchen", PlaybackState::Stopped)),
//! );
//! let link = TransportLink::new();
//! link.pair(transport);
//! ```

pub mod error;
pub mod link;
pub mod memory;
pub mod transport;
pub mod zone;

pub use error::{Result, TransportError};
pub use link::{PairedTransport, TransportLink};
pub use memory::{MemoryTransport, TransportCall};
pub use transport::{ControlCommand, MuteMode, SeekMode, Transport, VolumeMode};
pub use zone::{PlaybackState, ZoneChange, ZoneRef, ZoneSnapshot};
