//! User settings snapshot
//!
//! A [`Settings`] value describes which panels to connect to, which zone each
//! one controls, what colour its LED shows for each playback state and what
//! each key does. The controller only ever reads a validated snapshot; the
//! snapshot is replaced wholesale when the user saves new settings.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use panel_protocol::KeyId;
use serde::{Deserialize, Serialize};
use zone_transport::ZoneRef;

use crate::error::ConfigError;

pub const DEFAULT_LONG_PRESS_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_SEEK_AMOUNT: u32 = 5;
pub const DEFAULT_VOLUME_STEP: u32 = 5;

const LONG_PRESS_TIMEOUT_RANGE: (u64, u64) = (100, 2000);
const SEEK_AMOUNT_RANGE: (u64, u64) = (1, 60);
const VOLUME_STEP_RANGE: (u64, u64) = (1, 100);

/// An LED colour in `#RRGGBB` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedColor(String);

impl LedColor {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let hex = value
            .strip_prefix('#')
            .ok_or_else(|| ConfigError::InvalidColor(value.to_string()))?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidColor(value.to_string()));
        }
        Ok(Self(format!("#{}", hex.to_ascii_uppercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LedColor {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LedColor> for String {
    fn from(color: LedColor) -> Self {
        color.0
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-state LED colours for one panel.
///
/// A colour left as `None` is never written; the LED keeps whatever it
/// showed before.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedColors {
    pub playing: Option<LedColor>,
    pub loading: Option<LedColor>,
    pub stopped: Option<LedColor>,
    /// Older settings files carry a paused colour; it is read and discarded
    #[serde(skip_serializing)]
    paused: Option<LedColor>,
}

impl LedColors {
    pub fn new(
        playing: Option<LedColor>,
        loading: Option<LedColor>,
        stopped: Option<LedColor>,
    ) -> Self {
        Self {
            playing,
            loading,
            stopped,
            paused: None,
        }
    }

    fn fill_defaults(&mut self) {
        self.playing.get_or_insert_with(|| LedColor("#00FF00".to_string()));
        self.loading.get_or_insert_with(|| LedColor("#00FFFF".to_string()));
        self.stopped.get_or_insert_with(|| LedColor("#FFFFFF".to_string()));
        self.paused = None;
    }
}

/// Which kind of interaction an action is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressKind {
    Press,
    LongPress,
}

impl PressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressKind::Press => "press",
            PressKind::LongPress => "long-press",
        }
    }
}

impl fmt::Display for PressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action identifiers a key can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    TogglePlay,
    SeekFwd,
    SeekBack,
    Stop,
    PauseAll,
    Next,
    Previous,
    ToggleMute,
    VolumeUp,
    VolumeDown,
    #[default]
    None,
}

impl Action {
    /// Binding used for a key that has none configured
    pub fn default_for(key: KeyId, kind: PressKind) -> Self {
        match (kind, key.as_u32()) {
            (PressKind::Press, 1) => Action::TogglePlay,
            (PressKind::Press, 2) => Action::ToggleMute,
            (PressKind::Press, 3) => Action::Previous,
            (PressKind::Press, 4) => Action::Next,
            (PressKind::LongPress, 1) => Action::Stop,
            _ => Action::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::TogglePlay => "toggleplay",
            Action::SeekFwd => "seekfwd",
            Action::SeekBack => "seekback",
            Action::Stop => "stop",
            Action::PauseAll => "pauseall",
            Action::Next => "next",
            Action::Previous => "previous",
            Action::ToggleMute => "togglemute",
            Action::VolumeUp => "volumeup",
            Action::VolumeDown => "volumedown",
            Action::None => "none",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Press and long-press actions for one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBinding {
    pub press: Option<Action>,
    pub long_press: Option<Action>,
}

impl KeyBinding {
    pub fn new(press: Action, long_press: Action) -> Self {
        Self {
            press: Some(press),
            long_press: Some(long_press),
        }
    }
}

/// Settings for one panel slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Slot number, 1-based and stable
    pub index: usize,
    /// Panel address; empty leaves the slot unconfigured
    pub ip: String,
    pub zone: Option<ZoneRef>,
    pub leds: LedColors,
    pub keys: BTreeMap<KeyId, KeyBinding>,
}

impl DeviceSettings {
    pub fn new(index: usize, ip: impl Into<String>) -> Self {
        Self {
            index,
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn with_zone(mut self, zone: impl Into<ZoneRef>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_leds(mut self, leds: LedColors) -> Self {
        self.leds = leds;
        self
    }

    pub fn with_key(mut self, key: impl Into<KeyId>, binding: KeyBinding) -> Self {
        self.keys.insert(key.into(), binding);
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.ip.trim().is_empty()
    }

    /// Action bound to `key` for `kind`, falling back to the per-key default
    pub fn action_for(&self, key: KeyId, kind: PressKind) -> Action {
        let binding = self.keys.get(&key);
        let configured = match kind {
            PressKind::Press => binding.and_then(|b| b.press),
            PressKind::LongPress => binding.and_then(|b| b.long_press),
        };
        configured.unwrap_or_else(|| Action::default_for(key, kind))
    }
}

/// The full settings snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub devices: Vec<DeviceSettings>,
    pub long_press_timeout_ms: u64,
    pub seek_amount: u32,
    pub volume_step: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            long_press_timeout_ms: DEFAULT_LONG_PRESS_TIMEOUT_MS,
            seek_amount: DEFAULT_SEEK_AMOUNT,
            volume_step: DEFAULT_VOLUME_STEP,
        }
    }
}

impl Settings {
    pub fn new(devices: Vec<DeviceSettings>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    /// Fill every unset LED colour and key action with its default
    ///
    /// Keys advertised by default bindings (1 through 4) are materialised so
    /// the saved file shows what each key does.
    pub fn with_defaults(mut self) -> Self {
        for device in &mut self.devices {
            device.leds.fill_defaults();
            for key in 1..=4u32 {
                device.keys.entry(KeyId::new(key)).or_default();
            }
            for (key, binding) in device.keys.iter_mut() {
                binding
                    .press
                    .get_or_insert_with(|| Action::default_for(*key, PressKind::Press));
                binding
                    .long_press
                    .get_or_insert_with(|| Action::default_for(*key, PressKind::LongPress));
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "long_press_timeout_ms",
            self.long_press_timeout_ms,
            LONG_PRESS_TIMEOUT_RANGE,
        )?;
        check_range("seek_amount", self.seek_amount.into(), SEEK_AMOUNT_RANGE)?;
        check_range("volume_step", self.volume_step.into(), VOLUME_STEP_RANGE)?;

        let mut indices = HashSet::new();
        let mut ips = HashSet::new();
        for device in &self.devices {
            if device.index == 0 {
                return Err(ConfigError::Invalid(
                    "Device index must start at 1".to_string(),
                ));
            }
            if !indices.insert(device.index) {
                return Err(ConfigError::DuplicateDeviceIndex(device.index));
            }
            if device.is_configured() && !ips.insert(device.ip.trim()) {
                return Err(ConfigError::DuplicateDeviceIp(device.ip.trim().to_string()));
            }
        }

        Ok(())
    }

    /// Read settings from a JSON file, apply defaults and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(raw)?;
        let settings = settings.with_defaults();
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let file_error = |source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(file_error)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(file_error)
    }

    /// Settings for the slot with this index
    pub fn device(&self, index: usize) -> Option<&DeviceSettings> {
        self.devices.iter().find(|d| d.index == index)
    }

    /// Slots that have an IP address
    pub fn configured_devices(&self) -> impl Iterator<Item = &DeviceSettings> {
        self.devices.iter().filter(|d| d.is_configured())
    }

    pub fn long_press_timeout(&self) -> Duration {
        Duration::from_millis(self.long_press_timeout_ms)
    }
}

fn check_range(field: &'static str, value: u64, (min, max): (u64, u64)) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
