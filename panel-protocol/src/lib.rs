//! # panel-protocol
//!
//! Line protocol spoken by iPort surface mount button panels over TCP.
//!
//! Panels send newline-delimited UTF-8 text:
//!
//! - `#...` lines are comments
//! - `led=...` lines echo an LED write (or answer a `led=?` probe)
//! - everything else is a JSON object: first an identity handshake
//!   `{"deviceId","model","version","keys":[{"label"}]}`, then event batches
//!   `{"events":[{"label","state"}]}`
//!
//! The controller writes `\nled=<#RRGGBB>\n` to set the LED and `\nled=?\n`
//! as a keep-alive.
//!
//! ## Usage
//!
//! ```rust
//! use panel_protocol::{decode_line, InboundLine, LineFramer};
//!
//! let mut framer = LineFramer::new();
//! framer.push(b"# boot\n{\"events\":[{\"label\":\"Key1\",\"state\":\"1\"}]}\n");
//!
//! while let Ok(Some(line)) = framer.next_line() {
//!     if let Ok(InboundLine::Message(msg)) = decode_line(&line) {
//!         assert!(msg.events().unwrap().is_some());
//!     }
//! }
//! ```

pub mod error;
pub mod framer;
pub mod inbound;
pub mod outbound;

pub use error::{ProtocolError, ProtocolResult};
pub use framer::{LineFramer, DEFAULT_MAX_LINE_LEN};
pub use inbound::{
    decode_line, DeviceIdentity, InboundLine, KeyDescriptor, KeyEvent, KeyId, KeySignal,
    PanelMessage, COMMENT_PREFIX, LED_PREFIX,
};
pub use outbound::Outbound;
