//! Outbound commands written to a panel

use bytes::Bytes;

use crate::inbound::LED_PREFIX;

/// Commands the controller sends to a panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Set the LED to a `#RRGGBB` colour
    SetLed(String),
    /// Keep-alive probe; the panel answers with its current LED value
    QueryLed,
}

impl Outbound {
    /// Frame the command for the wire.
    ///
    /// A leading line feed terminates any partial line the panel may still
    /// be holding from earlier traffic.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Outbound::SetLed(color) => Bytes::from(format!("\n{LED_PREFIX}{color}\n")),
            Outbound::QueryLed => Bytes::from(format!("\n{LED_PREFIX}?\n")),
        }
    }
}
