//! # button-controller
//!
//! Keeps iPort surface mount button panels connected, turns their key
//! signals into press and long-press actions against a playback transport,
//! and mirrors each bound zone's playback state onto the panel LED.
//!
//! ## Architecture
//!
//! - [`ConnectionManager`] reconciles [`Settings`] against live sessions once
//!   per scan interval and follows transport pairing and zone changes.
//! - Each panel gets a session task that owns its socket, a
//!   [`ButtonClassifier`], a [`LedSynchronizer`] and its long-press timers.
//! - [`ActionDispatcher`] turns key actions into [`zone_transport::Transport`]
//!   calls, skipping them while no transport is paired.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use button_controller::{ConnectionManager, ControllerConfig, DeviceSettings, Settings};
//! use zone_transport::{MemoryTransport, TransportLink};
//!
//! let settings = Settings::new(vec![
//!     DeviceSettings::new(1, "192.168.1.40").with_zone("kitchen"),
//! ])
//! .with_defaults();
//!
//! let link = TransportLink::paired(Arc::new(MemoryTransport::new()));
//! let manager = ConnectionManager::start(ControllerConfig::default(), settings, link)?;
//! ```

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod led;
pub mod logging;
pub mod manager;
pub mod registry;
mod session;
pub mod settings;
pub mod status;

pub use classifier::{
    ButtonClassifier, ButtonEvent, LongPressTimer, PressState, SequenceAllocator, Transition,
};
pub use config::{ControllerConfig, DEFAULT_DEVICE_PORT};
pub use dispatcher::{ActionDispatcher, DispatchOutcome, SkipReason, TransportRequest};
pub use error::{ConfigError, ControllerError, Result};
pub use event::{CloseReason, ControllerEvent};
pub use led::{LedState, LedSynchronizer};
pub use logging::{
    init_logging, init_logging_from_env, init_logging_with_filter, LoggingError, LoggingMode,
};
pub use manager::ConnectionManager;
pub use registry::{SessionId, SessionInfo, SessionPhase};
pub use settings::{
    Action, DeviceSettings, KeyBinding, LedColor, LedColors, PressKind, Settings,
};
