//! Button debounce state machine
//!
//! Turns raw down/up signals for one panel into press and long-press events.
//! Each key moves Idle -> Pressed(seq) -> Idle (press) or
//! Idle -> Pressed(seq) -> LongPressed -> Idle (long-press on timeout, the
//! release is swallowed).
//!
//! The classifier never cancels a timer. Every button-down allocates a new
//! sequence number and the timer carries it back; a timer whose sequence no
//! longer matches the key's state is ignored. Callers are free to cancel
//! timers as an optimisation, but correctness never depends on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use panel_protocol::{KeyId, KeySignal};

use crate::registry::SessionId;
use crate::settings::PressKind;

/// Process-wide source of press sequence numbers
#[derive(Debug, Clone, Default)]
pub struct SequenceAllocator(Arc<AtomicU64>);

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number, starting at 1
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Debounce state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressState {
    #[default]
    Idle,
    Pressed(u64),
    LongPressed,
}

/// A classified button interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub session: SessionId,
    pub key: KeyId,
    pub kind: PressKind,
}

/// One-shot long-press timer request.
///
/// Identifies exactly one press cycle; hand it back to
/// [`ButtonClassifier::timer_fired`] when the timeout elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongPressTimer {
    pub session: SessionId,
    pub key: KeyId,
    pub seq: u64,
}

/// Outcome of feeding the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A press cycle started; arm this timer
    Schedule(LongPressTimer),
    /// A semantic event is ready for dispatch
    Emit(ButtonEvent),
    /// Nothing to do
    Ignored,
}

/// Per-session classifier, keyed by key number
#[derive(Debug)]
pub struct ButtonClassifier {
    session: SessionId,
    sequences: SequenceAllocator,
    keys: HashMap<KeyId, PressState>,
}

impl ButtonClassifier {
    pub fn new(session: SessionId, sequences: SequenceAllocator) -> Self {
        Self {
            session,
            sequences,
            keys: HashMap::new(),
        }
    }

    pub fn signal(&mut self, signal: KeySignal) -> Transition {
        if signal.down {
            self.button_down(signal.key)
        } else {
            self.button_up(signal.key)
        }
    }

    pub fn button_down(&mut self, key: KeyId) -> Transition {
        let state = self.keys.entry(key).or_default();
        match *state {
            PressState::Idle => {
                let seq = self.sequences.next();
                *state = PressState::Pressed(seq);
                tracing::trace!(session = %self.session, %key, seq, "Key down");
                Transition::Schedule(LongPressTimer {
                    session: self.session,
                    key,
                    seq,
                })
            }
            // Chatty hardware repeats downs; keep the original cycle
            PressState::Pressed(_) | PressState::LongPressed => Transition::Ignored,
        }
    }

    /// Released keys are dropped from the map; an absent key reads as idle.
    pub fn button_up(&mut self, key: KeyId) -> Transition {
        match self.keys.remove(&key) {
            Some(PressState::Pressed(_)) => Transition::Emit(self.event(key, PressKind::Press)),
            Some(PressState::LongPressed | PressState::Idle) | None => Transition::Ignored,
        }
    }

    pub fn timer_fired(&mut self, timer: LongPressTimer) -> Transition {
        if timer.session != self.session {
            return Transition::Ignored;
        }
        match self.keys.get_mut(&timer.key) {
            Some(state) if *state == PressState::Pressed(timer.seq) => {
                *state = PressState::LongPressed;
                Transition::Emit(self.event(timer.key, PressKind::LongPress))
            }
            _ => {
                tracing::trace!(session = %self.session, key = %timer.key, seq = timer.seq, "Stale long-press timer");
                Transition::Ignored
            }
        }
    }

    pub fn state(&self, key: KeyId) -> PressState {
        self.keys.get(&key).copied().unwrap_or_default()
    }

    fn event(&self, key: KeyId, kind: PressKind) -> ButtonEvent {
        ButtonEvent {
            session: self.session,
            key,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key1() -> KeyId {
        KeyId::new(1)
    }

    fn classifier() -> ButtonClassifier {
        ButtonClassifier::new(SessionId::new(1), SequenceAllocator::new())
    }

    fn scheduled(transition: Transition) -> LongPressTimer {
        match transition {
            Transition::Schedule(timer) => timer,
            other => panic!("expected a timer, got {other:?}"),
        }
    }

    #[test]
    fn test_sequence_allocator_is_shared() {
        let sequences = SequenceAllocator::new();
        let clone = sequences.clone();
        assert_eq!(sequences.next(), 1);
        assert_eq!(clone.next(), 2);
    }

    #[test]
    fn test_press_before_timeout() {
        let mut classifier = classifier();
        let timer = scheduled(classifier.button_down(key1()));
        assert_eq!(classifier.state(key1()), PressState::Pressed(timer.seq));

        let transition = classifier.button_up(key1());
        assert_eq!(
            transition,
            Transition::Emit(ButtonEvent {
                session: SessionId::new(1),
                key: key1(),
                kind: PressKind::Press,
            })
        );
        assert_eq!(classifier.state(key1()), PressState::Idle);

        // The timer still fires later but is stale
        assert_eq!(classifier.timer_fired(timer), Transition::Ignored);
        assert_eq!(classifier.state(key1()), PressState::Idle);
    }

    #[test]
    fn test_long_press_swallows_release() {
        let mut classifier = classifier();
        let timer = scheduled(classifier.button_down(key1()));

        match classifier.timer_fired(timer) {
            Transition::Emit(event) => assert_eq!(event.kind, PressKind::LongPress),
            other => panic!("expected long-press, got {other:?}"),
        }
        assert_eq!(classifier.state(key1()), PressState::LongPressed);

        assert_eq!(classifier.button_up(key1()), Transition::Ignored);
        assert_eq!(classifier.state(key1()), PressState::Idle);
    }

    #[test]
    fn test_released_keys_are_forgotten() {
        let mut classifier = classifier();

        scheduled(classifier.button_down(key1()));
        classifier.button_up(key1());

        let timer = scheduled(classifier.button_down(KeyId::new(2)));
        classifier.timer_fired(timer);
        classifier.button_up(KeyId::new(2));

        assert_eq!(classifier.button_up(KeyId::new(3)), Transition::Ignored);
        assert!(classifier.keys.is_empty());
        assert_eq!(classifier.state(key1()), PressState::Idle);
    }

    #[test]
    fn test_duplicate_down_keeps_sequence() {
        let mut classifier = classifier();
        let timer = scheduled(classifier.button_down(key1()));

        assert_eq!(classifier.button_down(key1()), Transition::Ignored);
        assert_eq!(classifier.state(key1()), PressState::Pressed(timer.seq));

        classifier.timer_fired(timer);
        assert_eq!(classifier.button_down(key1()), Transition::Ignored);
        assert_eq!(classifier.state(key1()), PressState::LongPressed);
    }

    #[test]
    fn test_timer_from_previous_cycle_is_stale() {
        let mut classifier = classifier();
        let first = scheduled(classifier.button_down(key1()));
        classifier.button_up(key1());
        let second = scheduled(classifier.button_down(key1()));
        assert!(second.seq > first.seq);

        assert_eq!(classifier.timer_fired(first), Transition::Ignored);
        assert_eq!(classifier.state(key1()), PressState::Pressed(second.seq));
    }

    #[test]
    fn test_up_without_down_is_ignored() {
        let mut classifier = classifier();
        assert_eq!(classifier.button_up(key1()), Transition::Ignored);
    }

    #[test]
    fn test_timer_for_other_session_is_ignored() {
        let sequences = SequenceAllocator::new();
        let mut first = ButtonClassifier::new(SessionId::new(1), sequences.clone());
        let mut second = ButtonClassifier::new(SessionId::new(2), sequences);

        let timer = scheduled(first.button_down(key1()));
        second.button_down(key1());
        assert_eq!(second.timer_fired(timer), Transition::Ignored);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut classifier = classifier();
        let timer1 = scheduled(classifier.button_down(KeyId::new(1)));
        scheduled(classifier.button_down(KeyId::new(2)));

        assert!(matches!(classifier.button_up(KeyId::new(2)), Transition::Emit(_)));
        assert!(matches!(classifier.timer_fired(timer1), Transition::Emit(_)));
    }
}
