//! # Session Module
//!
//! Ties the pipeline together. A [`Session`] owns one estimator, one stability
//! gate and one locked-note set, and processes frames strictly in arrival
//! order. A [`LiveSession`] additionally owns the capture source and releases
//! it on every exit path.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::{self, AudioFrame, Capture, CaptureConfig};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::key::{self, KeyResult, KeyScore, LockedNoteSet};
use crate::pitch::{FrequencyEstimator, PitchEstimate};
use crate::stability::{GateEvent, GateState, StabilityGate};
use crate::tuning::{self, Note, PitchClass};

/// Everything the pipeline derived from one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameReport {
    /// Zero-based position of the frame within the session.
    pub frame_index: u64,
    pub estimate: PitchEstimate,
    /// The quantized note; `None` when the frame had no reliable pitch.
    pub note: Option<Note>,
    pub event: Option<GateEvent>,
}

impl FrameReport {
    /// Frequency passed to observers: the estimate, or `0.0` without a note.
    pub fn frequency_hz(&self) -> f32 {
        self.note.map_or(0.0, |n| n.frequency_hz)
    }

    /// The pitch class that locked on this frame, if any.
    pub fn locked(&self) -> Option<PitchClass> {
        match self.event {
            Some(GateEvent::Locked(pitch_class)) => Some(pitch_class),
            _ => None,
        }
    }

    /// Delivers this report to an observer.
    pub fn notify<O: SessionObserver + ?Sized>(&self, observer: &mut O) {
        observer.on_frame(self.note.as_ref(), self.frequency_hz());
        match self.event {
            Some(GateEvent::Pending(pitch_class)) => observer.on_pending(Some(pitch_class)),
            Some(GateEvent::PendingCleared) => observer.on_pending(None),
            Some(GateEvent::Locked(pitch_class)) => {
                observer.on_pending(None);
                observer.on_note_locked(pitch_class);
            }
            None => {}
        }
    }
}

/// Receives pipeline output, typically a user interface.
pub trait SessionObserver {
    /// Called once per frame with the detected note, or `(None, 0.0)`.
    fn on_frame(&mut self, note: Option<&Note>, frequency_hz: f32);

    /// Called exactly once per lock.
    fn on_note_locked(&mut self, pitch_class: PitchClass);

    /// The candidate currently being evaluated, or `None` when it was dropped
    /// or has locked.
    fn on_pending(&mut self, _pending: Option<PitchClass>) {}
}

/// Snapshot of a session's outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub locked_notes: Vec<PitchClass>,
    pub key: KeyResult,
    pub ranking: Vec<KeyScore>,
}

/// One detection session over an ordered stream of frames.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    estimator: FrequencyEstimator,
    gate: StabilityGate,
    locked: LockedNoteSet,
    frames_processed: u64,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            estimator: FrequencyEstimator::new(config.estimator.clone()),
            gate: StabilityGate::new(config.gate.clone()),
            locked: LockedNoteSet::new(),
            frames_processed: 0,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs one frame through estimator, quantizer and gate.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> FrameReport {
        let estimate = self.estimator.estimate(frame);
        self.process_estimate(estimate)
    }

    /// Runs an already-estimated pitch through quantizer and gate.
    pub fn process_estimate(&mut self, estimate: PitchEstimate) -> FrameReport {
        let note = estimate.frequency().map(tuning::quantize);
        let event = self
            .gate
            .observe(note.map(|n| n.pitch_class), estimate.frequency_hz);

        if let Some(GateEvent::Locked(pitch_class)) = event {
            let new = self.locked.insert(pitch_class);
            info!(%pitch_class, new, total = self.locked.len(), "note locked");
        }

        let report = FrameReport {
            frame_index: self.frames_processed,
            estimate,
            note,
            event,
        };
        self.frames_processed += 1;
        report
    }

    /// Lazily processes a frame source, one report per frame.
    ///
    /// The sequence ends with the source; frames are consumed in order.
    pub fn reports<'a, I>(&'a mut self, frames: I) -> impl Iterator<Item = FrameReport> + 'a
    where
        I: IntoIterator<Item = AudioFrame>,
        I::IntoIter: 'a,
    {
        frames.into_iter().map(move |frame| self.process_frame(&frame))
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn locked_notes(&self) -> &LockedNoteSet {
        &self.locked
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Key estimate from the notes locked so far.
    pub fn best_key(&self) -> KeyResult {
        key::best_key(&self.locked)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames_processed: self.frames_processed,
            locked_notes: self.locked.iter().collect(),
            key: self.best_key(),
            ranking: key::rank_keys(&self.locked),
        }
    }

    /// Clears gate state and locked notes, as at the start of a new session.
    pub fn reset(&mut self) {
        self.gate.reset();
        self.locked.clear();
        self.frames_processed = 0;
        debug!("session reset");
    }
}

/// A session fed by a running capture source.
///
/// Frames are pulled with [`LiveSession::next_report`]. Stopping (explicitly
/// or by dropping) releases the capture source and discards queued frames.
pub struct LiveSession {
    session: Session,
    capture: Option<Box<dyn Capture>>,
    frames: Receiver<AudioFrame>,
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("session", &self.session)
            .field("active", &self.is_active())
            .finish()
    }
}

impl LiveSession {
    /// Starts a session on the default input device.
    pub fn start(config: SessionConfig) -> Result<Self> {
        Self::start_with(config, |capture, sender| {
            let handle = audio::start_audio_capture(capture, sender)?;
            if handle.sample_rate() != capture.sample_rate {
                warn!(
                    device = handle.device_name(),
                    requested = capture.sample_rate,
                    actual = handle.sample_rate(),
                    "device does not support the requested sample rate"
                );
            }
            Ok(Box::new(handle) as Box<dyn Capture>)
        })
    }

    /// Starts a session on a caller-provided capture source.
    ///
    /// On error nothing is left running and no session exists.
    pub fn start_with<F>(config: SessionConfig, start_capture: F) -> Result<Self>
    where
        F: FnOnce(&CaptureConfig, Sender<AudioFrame>) -> Result<Box<dyn Capture>>,
    {
        config.validate()?;
        let (sender, frames) = crossbeam_channel::bounded(config.capture.channel_capacity);
        let capture = start_capture(&config.capture, sender)?;
        info!("session started");

        Ok(Self {
            session: Session::new(config),
            capture: Some(capture),
            frames,
        })
    }

    pub fn is_active(&self) -> bool {
        self.capture.is_some()
    }

    /// Waits up to `timeout` for the next frame and processes it.
    ///
    /// Returns `None` on timeout, after stop, or when the source has ended
    /// (which stops the session).
    pub fn next_report(&mut self, timeout: Duration) -> Option<FrameReport> {
        if !self.is_active() {
            return None;
        }
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Some(self.session.process_frame(&frame)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("capture source ended");
                self.stop();
                None
            }
        }
    }

    /// Stops capture. Calling this more than once has no further effect.
    pub fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop();
            let discarded = self.frames.try_iter().count();
            info!(
                discarded,
                locked = self.session.locked_notes().len(),
                "session stopped"
            );
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn best_key(&self) -> KeyResult {
        self.session.best_key()
    }

    pub fn summary(&self) -> SessionSummary {
        self.session.summary()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.stop();
    }
}
