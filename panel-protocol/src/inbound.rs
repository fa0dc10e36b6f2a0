//! Inbound line classification and panel message types

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// Prefix marking a comment line
pub const COMMENT_PREFIX: char = '#';

/// Prefix of LED writes, and of the panel's echo of them
pub const LED_PREFIX: &str = "led=";

/// One classified line received from a panel
#[derive(Debug, Clone, PartialEq)]
pub enum InboundLine {
    /// Empty or whitespace-only line
    Blank,
    /// `#...` comment, dropped by the session
    Comment(String),
    /// `led=...` echo of an LED write or a reply to `led=?`; carries the value
    LedEcho(String),
    /// Any other line, decoded as a JSON object
    Message(PanelMessage),
}

/// Classify a single line.
///
/// Comments and LED echoes are recognised by prefix and never reach the JSON
/// decoder. Everything else must decode to a JSON object; a failure is
/// reported for this line only.
pub fn decode_line(line: &str) -> ProtocolResult<InboundLine> {
    if line.trim().is_empty() {
        return Ok(InboundLine::Blank);
    }
    if line.starts_with(COMMENT_PREFIX) {
        return Ok(InboundLine::Comment(line.to_string()));
    }
    if let Some(value) = line.strip_prefix(LED_PREFIX) {
        return Ok(InboundLine::LedEcho(value.trim().to_string()));
    }

    let value: Value = serde_json::from_str(line).map_err(|source| ProtocolError::Decode {
        line: line.to_string(),
        source,
    })?;

    match value {
        Value::Object(fields) => Ok(InboundLine::Message(PanelMessage(fields))),
        other => Err(ProtocolError::NotAnObject(other.to_string())),
    }
}

/// A decoded JSON object received from a panel.
///
/// Whether it is the identity handshake or an event batch depends on where
/// it sits in the connection, so interpretation is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelMessage(Map<String, Value>);

impl PanelMessage {
    /// Interpret this message as the identity handshake.
    ///
    /// Missing fields are left empty; a panel that sends a sparse first
    /// message is still considered identified.
    pub fn identity(&self) -> DeviceIdentity {
        serde_json::from_value(Value::Object(self.0.clone())).unwrap_or_default()
    }

    /// Extract the `events` list, if the message carries one.
    ///
    /// Entries are decoded one at a time, so a malformed entry only costs
    /// itself; the outer error is reserved for an `events` field that is not
    /// a list.
    pub fn events(&self) -> ProtocolResult<Option<Vec<ProtocolResult<KeyEvent>>>> {
        let entries = match self.0.get("events") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return serde_json::from_value::<Vec<Value>>(other.clone())
                    .map(|_| None)
                    .map_err(ProtocolError::MalformedEvents)
            }
        };

        let events = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                KeyEvent::deserialize(entry)
                    .map_err(|source| ProtocolError::MalformedEvent { index, source })
            })
            .collect();
        Ok(Some(events))
    }

    /// Raw access to the decoded fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Identity handshake sent by a panel as its first message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    #[serde(rename = "deviceId", alias = "deviceid")]
    pub device_id: String,
    pub model: String,
    pub version: String,
    pub keys: Vec<KeyDescriptor>,
}

impl DeviceIdentity {
    /// Key numbers advertised by the panel, in the order listed.
    ///
    /// Labels without a key number are skipped.
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.keys
            .iter()
            .filter_map(|k| KeyId::from_label(&k.label).ok())
            .collect()
    }
}

/// A key advertised in the identity handshake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyDescriptor {
    pub label: String,
}

/// Key number, taken from the digits of a key label (`"Key3"` is key 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(u32);

impl KeyId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Extract the key number from a label.
    ///
    /// All digits in the label are concatenated, so `"Key12"` is key 12.
    pub fn from_label(label: &str) -> ProtocolResult<Self> {
        let digits: String = label.chars().filter(char::is_ascii_digit).collect();
        digits
            .parse()
            .map(Self)
            .map_err(|_| ProtocolError::MissingKeyNumber(label.to_string()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for KeyId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// One raw entry of an `events` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub label: String,
    #[serde(default)]
    pub state: Value,
}

impl KeyEvent {
    /// `"1"` means the button went down; anything else is a release
    pub fn is_down(&self) -> bool {
        match &self.state {
            Value::String(s) => s == "1",
            Value::Number(n) => n.as_u64() == Some(1),
            _ => false,
        }
    }

    /// Resolve this event into a key number and direction
    pub fn signal(&self) -> ProtocolResult<KeySignal> {
        Ok(KeySignal {
            key: KeyId::from_label(&self.label)?,
            down: self.is_down(),
        })
    }
}

/// A raw button-down or button-up for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySignal {
    pub key: KeyId,
    pub down: bool,
}
