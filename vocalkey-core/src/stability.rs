//! # Stability Gate Module
//!
//! Debounces the jittery frame-by-frame note stream into discrete
//! "note locked" events. A pitch class has to be held for a run of
//! consecutive frames before it locks, and a sustained hold locks once.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tuning::PitchClass;

/// Repeats needed before a note locks (~300-400 ms at 60 frames per second).
pub const DEFAULT_LOCK_THRESHOLD: u32 = 15;

/// What happens to the remembered pitch class when silence interrupts a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilencePolicy {
    /// Keep the last pitch class; the same note resumes counting from zero
    /// without a new pending signal.
    #[default]
    PreserveIdentity,
    /// Forget the last pitch class; the resumed note starts a new candidate.
    ClearIdentity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// The lock fires when the repeat count exceeds this value.
    pub lock_threshold: u32,
    /// Confident frames must lie strictly above this frequency; frames at or
    /// below it count as noise.
    pub min_frequency_hz: f32,
    pub silence_policy: SilencePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lock_threshold: DEFAULT_LOCK_THRESHOLD,
            min_frequency_hz: 80.0,
            silence_policy: SilencePolicy::default(),
        }
    }
}

impl GateConfig {
    /// Consecutive frames of one pitch class needed to produce a lock:
    /// the frame that introduces the note plus `lock_threshold + 1` repeats.
    pub fn frames_to_lock(&self) -> u32 {
        self.lock_threshold + 2
    }
}

/// Observable state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    /// No candidate is being evaluated.
    Idle,
    /// A candidate is accumulating consecutive frames.
    Tracking,
    /// The current candidate has locked; further repeats are ignored.
    Locked,
}

/// Side effects of feeding one frame to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateEvent {
    /// A new candidate note is being evaluated.
    Pending(PitchClass),
    /// The pending candidate was dropped by silence or noise.
    PendingCleared,
    /// The candidate was held long enough and is now locked.
    Locked(PitchClass),
}

/// Per-session debounce state machine.
///
/// Frames must be fed strictly in arrival order.
#[derive(Debug, Clone)]
pub struct StabilityGate {
    config: GateConfig,
    state: GateState,
    last_pitch_class: Option<PitchClass>,
    consecutive_frames: u32,
}

impl StabilityGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: GateState::Idle,
            last_pitch_class: None,
            consecutive_frames: 0,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn last_pitch_class(&self) -> Option<PitchClass> {
        self.last_pitch_class
    }

    pub fn consecutive_frames(&self) -> u32 {
        self.consecutive_frames
    }

    /// Returns the gate to a fresh-session condition.
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.last_pitch_class = None;
        self.consecutive_frames = 0;
    }

    /// Feeds one frame.
    ///
    /// # Arguments
    /// * `pitch_class` - The quantized note, or `None` for a frame without pitch
    /// * `frequency` - The estimated frequency in Hz (`0.0` without pitch)
    ///
    /// # Returns
    /// * The event this frame triggered, if any
    pub fn observe(&mut self, pitch_class: Option<PitchClass>, frequency: f32) -> Option<GateEvent> {
        match pitch_class {
            Some(pitch_class) if frequency > self.config.min_frequency_hz => {
                self.observe_note(pitch_class)
            }
            _ => self.observe_silence(),
        }
    }

    fn observe_note(&mut self, pitch_class: PitchClass) -> Option<GateEvent> {
        if self.last_pitch_class != Some(pitch_class) {
            self.last_pitch_class = Some(pitch_class);
            self.consecutive_frames = 0;
            self.state = GateState::Tracking;
            debug!(%pitch_class, "pending note");
            return Some(GateEvent::Pending(pitch_class));
        }

        if self.state == GateState::Locked {
            return None;
        }

        self.state = GateState::Tracking;
        self.consecutive_frames += 1;
        if self.consecutive_frames > self.config.lock_threshold {
            self.consecutive_frames = 0;
            self.state = GateState::Locked;
            debug!(%pitch_class, "note locked");
            return Some(GateEvent::Locked(pitch_class));
        }
        None
    }

    fn observe_silence(&mut self) -> Option<GateEvent> {
        let was_pending = self.state == GateState::Tracking;
        self.state = GateState::Idle;
        self.consecutive_frames = 0;
        if self.config.silence_policy == SilencePolicy::ClearIdentity {
            self.last_pitch_class = None;
        }
        was_pending.then_some(GateEvent::PendingCleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(gate: &mut StabilityGate, pitch_class: PitchClass, frames: u32) -> Vec<GateEvent> {
        (0..frames)
            .filter_map(|_| gate.observe(Some(pitch_class), 392.0))
            .collect()
    }

    fn locks(events: &[GateEvent]) -> Vec<PitchClass> {
        events
            .iter()
            .filter_map(|e| match e {
                GateEvent::Locked(pc) => Some(*pc),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn one_frame_short_never_locks() {
        let mut gate = StabilityGate::new(GateConfig::default());
        let frames = gate.config().frames_to_lock() - 1;
        let events = feed(&mut gate, PitchClass::G, frames);
        assert_eq!(events, vec![GateEvent::Pending(PitchClass::G)]);
        assert_eq!(gate.state(), GateState::Tracking);
    }

    #[test]
    fn reaching_threshold_locks_exactly_once() {
        let mut gate = StabilityGate::new(GateConfig::default());
        let frames = gate.config().frames_to_lock();
        let events = feed(&mut gate, PitchClass::G, frames);
        assert_eq!(locks(&events), vec![PitchClass::G]);
        assert_eq!(gate.state(), GateState::Locked);
        assert_eq!(gate.consecutive_frames(), 0);

        // A long sustained hold does not lock again.
        let more = feed(&mut gate, PitchClass::G, 200);
        assert!(more.is_empty());
    }

    #[test]
    fn different_note_restarts_the_count() {
        let mut gate = StabilityGate::new(GateConfig::default());
        feed(&mut gate, PitchClass::E, 10);
        let events = feed(&mut gate, PitchClass::F, 1);
        assert_eq!(events, vec![GateEvent::Pending(PitchClass::F)]);
        assert_eq!(gate.consecutive_frames(), 0);
    }

    #[test]
    fn intervening_note_allows_relock() {
        let mut gate = StabilityGate::new(GateConfig::default());
        let n = gate.config().frames_to_lock();
        let mut events = feed(&mut gate, PitchClass::C, n);
        events.extend(feed(&mut gate, PitchClass::D, n));
        events.extend(feed(&mut gate, PitchClass::C, n));
        assert_eq!(locks(&events), vec![PitchClass::C, PitchClass::D, PitchClass::C]);
    }

    #[test]
    fn silence_clears_pending_but_keeps_identity() {
        let mut gate = StabilityGate::new(GateConfig::default());
        feed(&mut gate, PitchClass::A, 10);
        assert_eq!(gate.observe(None, 0.0), Some(GateEvent::PendingCleared));
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.last_pitch_class(), Some(PitchClass::A));

        // Resuming the same note counts from zero, silently.
        assert_eq!(gate.observe(Some(PitchClass::A), 440.0), None);
        assert_eq!(gate.consecutive_frames(), 1);

        // Needs a full fresh run of repeats to lock.
        let threshold = gate.config().lock_threshold;
        let events = feed(&mut gate, PitchClass::A, threshold - 1);
        assert!(locks(&events).is_empty());
        let events = feed(&mut gate, PitchClass::A, 1);
        assert_eq!(locks(&events), vec![PitchClass::A]);
    }

    #[test]
    fn silence_after_lock_allows_relock() {
        let mut gate = StabilityGate::new(GateConfig::default());
        let n = gate.config().frames_to_lock();
        feed(&mut gate, PitchClass::B, n);
        assert_eq!(gate.observe(None, 0.0), None);
        let threshold = gate.config().lock_threshold;
        let events = feed(&mut gate, PitchClass::B, threshold + 1);
        assert_eq!(locks(&events), vec![PitchClass::B]);
    }

    #[test]
    fn clear_identity_policy_restarts_candidate() {
        let config = GateConfig {
            silence_policy: SilencePolicy::ClearIdentity,
            ..GateConfig::default()
        };
        let mut gate = StabilityGate::new(config);
        feed(&mut gate, PitchClass::A, 5);
        gate.observe(None, 0.0);
        assert_eq!(gate.last_pitch_class(), None);
        assert_eq!(
            gate.observe(Some(PitchClass::A), 440.0),
            Some(GateEvent::Pending(PitchClass::A))
        );
    }

    #[test]
    fn low_frequency_counts_as_noise() {
        let mut gate = StabilityGate::new(GateConfig::default());
        feed(&mut gate, PitchClass::E, 3);
        assert_eq!(gate.observe(Some(PitchClass::E), 70.0), Some(GateEvent::PendingCleared));
        assert_eq!(gate.consecutive_frames(), 0);
    }

    #[test]
    fn reset_returns_to_fresh_state() {
        let mut gate = StabilityGate::new(GateConfig::default());
        feed(&mut gate, PitchClass::G, 30);
        gate.reset();
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.last_pitch_class(), None);
        assert_eq!(gate.consecutive_frames(), 0);
    }

    #[test]
    fn frequency_at_floor_counts_as_noise() {
        let mut gate = StabilityGate::new(GateConfig::default());
        assert_eq!(gate.observe(Some(PitchClass::E), 80.0), None);
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(
            gate.observe(Some(PitchClass::E), 82.4),
            Some(GateEvent::Pending(PitchClass::E))
        );
    }
}
