//! LED state selection and write deduplication

use std::fmt;

use zone_transport::PlaybackState;

use crate::settings::{LedColor, LedColors};

/// What the LED is showing, independent of the colour chosen for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedState {
    Playing,
    Loading,
    /// Stopped, paused, unbound or unknown
    Idle,
}

impl LedState {
    /// Map a zone's playback state; `None` means there is no usable zone
    pub fn from_playback(playback: Option<PlaybackState>) -> Self {
        match playback {
            Some(PlaybackState::Playing) => LedState::Playing,
            Some(PlaybackState::Loading) => LedState::Loading,
            Some(PlaybackState::Paused | PlaybackState::Stopped) | None => LedState::Idle,
        }
    }

    /// Colour configured for this state, if any
    pub fn color<'a>(&self, colors: &'a LedColors) -> Option<&'a LedColor> {
        match self {
            LedState::Playing => colors.playing.as_ref(),
            LedState::Loading => colors.loading.as_ref(),
            LedState::Idle => colors.stopped.as_ref(),
        }
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LedState::Playing => "playing",
            LedState::Loading => "loading",
            LedState::Idle => "idle",
        })
    }
}

/// Remembers the last state written to one panel's LED.
///
/// The comparison is on [`LedState`] rather than colour, so a colour edit
/// alone does not trigger a write; callers pass `forced` for that.
#[derive(Debug, Default)]
pub struct LedSynchronizer {
    last: Option<LedState>,
}

impl LedSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether to write, and what.
    ///
    /// Returns the colour to send, or `None` when the state is unchanged
    /// (and not forced) or no colour is configured for it. The remembered
    /// state only advances when a colour is returned.
    pub fn sync(
        &mut self,
        colors: &LedColors,
        playback: Option<PlaybackState>,
        forced: bool,
    ) -> Option<LedColor> {
        let target = LedState::from_playback(playback);
        if !forced && self.last == Some(target) {
            return None;
        }

        let color = target.color(colors)?.clone();
        self.last = Some(target);
        Some(color)
    }

    pub fn last(&self) -> Option<LedState> {
        self.last
    }

    /// Forget the last write so the next sync always writes
    pub fn reset(&mut self) {
        self.last = None;
    }
}
