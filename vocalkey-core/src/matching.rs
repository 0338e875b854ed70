//! # Target Matching Module
//!
//! Compares what the singer produces against a target note. The note class
//! must match (any octave counts) and the pitch must sit within a tolerance
//! window around it.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default width of the "in tune" window on either side of the target.
pub const DEFAULT_TOLERANCE_CENTS: f32 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub tolerance_cents: f32,
    /// How long a match has to be held before it counts as a success.
    pub confirm_after_ms: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance_cents: DEFAULT_TOLERANCE_CENTS,
            confirm_after_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// A different note class entirely.
    Neutral,
    /// Right note class, out of tune.
    Close,
    /// Right note class within tolerance.
    Match,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchMatch {
    pub status: MatchStatus,
    /// Distance to the nearest semitone; positive is sharp.
    pub cents_off: f32,
    /// Whole semitones between the sung pitch and the target.
    pub semitone_offset: i32,
    /// Octaves above (positive) or below the target; 0 unless the class is right.
    pub octave_offset: i32,
}

/// Classifies a sung frequency against a target frequency.
///
/// # Arguments
/// * `frequency` - Sung frequency in Hz
/// * `target_frequency` - Target note frequency in Hz
/// * `tolerance_cents` - Match window on either side of the target
pub fn match_target(frequency: f32, target_frequency: f32, tolerance_cents: f32) -> PitchMatch {
    let diff = 12.0 * (frequency / target_frequency).log2();
    let rounded = diff.round();
    let semitone_offset = rounded as i32;
    let cents_off = (diff - rounded) * 100.0;

    if semitone_offset.rem_euclid(12) != 0 {
        return PitchMatch {
            status: MatchStatus::Neutral,
            cents_off,
            semitone_offset,
            octave_offset: 0,
        };
    }

    let status = if cents_off.abs() <= tolerance_cents {
        MatchStatus::Match
    } else {
        MatchStatus::Close
    };
    PitchMatch {
        status,
        cents_off,
        semitone_offset,
        octave_offset: semitone_offset.div_euclid(12),
    }
}

/// Smooths the cents value shown on a tuning needle.
///
/// Halves the distance to each new reading and snaps to the center on a match.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NeedleSmoother {
    value: f32,
}

impl NeedleSmoother {
    pub fn update(&mut self, reading: &PitchMatch) -> f32 {
        self.value = match reading.status {
            MatchStatus::Match => 0.0,
            _ => self.value * 0.5 + reading.cents_off * 0.5,
        };
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Tracks a target note across frames and confirms a held match.
#[derive(Debug, Clone)]
pub struct TargetTracker {
    target_frequency: f32,
    config: MatchConfig,
    matched_since: Option<Instant>,
    needle: NeedleSmoother,
}

/// Result of feeding one frame to a [`TargetTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    pub reading: PitchMatch,
    /// Smoothed cents for display.
    pub needle_cents: f32,
    /// The match has been held for the confirmation period.
    pub confirmed: bool,
}

impl TargetTracker {
    pub fn new(target_frequency: f32, config: MatchConfig) -> Self {
        Self {
            target_frequency,
            config,
            matched_since: None,
            needle: NeedleSmoother::default(),
        }
    }

    pub fn target_frequency(&self) -> f32 {
        self.target_frequency
    }

    /// Feeds one sung frequency observed at `now`.
    ///
    /// Frequencies that are not positive are ignored and return `None`.
    pub fn update(&mut self, frequency: f32, now: Instant) -> Option<TrackerUpdate> {
        if frequency <= 0.0 {
            return None;
        }

        let reading = match_target(frequency, self.target_frequency, self.config.tolerance_cents);
        let needle_cents = self.needle.update(&reading);

        let confirmed = if reading.status == MatchStatus::Match {
            let since = *self.matched_since.get_or_insert(now);
            now.duration_since(since) >= Duration::from_millis(self.config.confirm_after_ms)
        } else {
            self.matched_since = None;
            false
        };

        Some(TrackerUpdate {
            reading,
            needle_cents,
            confirmed,
        })
    }

    pub fn reset(&mut self) {
        self.matched_since = None;
        self.needle.reset();
    }
}
