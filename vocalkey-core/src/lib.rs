// vocalkey-core/src/lib.rs

//! The core logic for the vocal key finder.
//! This crate turns microphone frames into pitch estimates, quantizes them to
//! notes, debounces those into locked notes and infers the major key of what
//! was sung. It is completely headless and contains no UI code.
//!
//! A typical offline run:
//!
//! ```
//! use vocalkey_core::{AudioFrame, Session, SessionConfig};
//!
//! let mut session = Session::new(SessionConfig::default());
//! let frame = AudioFrame::new(vec![0.0; 2048], 44_100);
//! let report = session.process_frame(&frame);
//! assert!(report.note.is_none());
//! assert!(session.best_key().tonic.is_none());
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod key;
pub mod matching;
pub mod pitch;
pub mod session;
pub mod stability;
pub mod tuning;

pub use audio::{AudioFrame, Capture, CaptureConfig};
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use key::{KeyResult, KeyScore, LockedNoteSet, best_key, rank_keys};
pub use matching::{MatchConfig, MatchStatus, PitchMatch, TargetTracker};
pub use pitch::{EstimationMethod, FrequencyEstimator, PitchEstimate};
pub use session::{FrameReport, LiveSession, Session, SessionObserver, SessionSummary};
pub use stability::{GateConfig, GateEvent, GateState, SilencePolicy, StabilityGate};
pub use tuning::{Note, PitchClass, quantize};
