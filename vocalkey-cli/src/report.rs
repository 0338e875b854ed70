//! Console rendering of pipeline output.

use std::io::Write;

use vocalkey_core::key::MIN_KEY_EVIDENCE;
use vocalkey_core::matching::TrackerUpdate;
use vocalkey_core::{KeyResult, KeyScore, MatchStatus, Note, PitchClass, SessionObserver};

/// "A4 +3.2c (440.8 Hz)"
pub fn format_note(note: &Note) -> String {
    format!(
        "{} {:+.1}c ({:.1} Hz)",
        note.name(),
        note.cents_deviation,
        note.frequency_hz
    )
}

/// Human-readable key line; `locked` is the size of the locked-note set.
pub fn format_key(result: &KeyResult, locked: usize) -> String {
    match result.tonic {
        Some(tonic) => format!(
            "{tonic} major ({} of {locked} locked notes in scale)",
            result.match_count
        ),
        None => format!("unknown (need at least {MIN_KEY_EVIDENCE} locked notes, have {locked})"),
    }
}

pub fn format_ranking(ranking: &[KeyScore], limit: usize) -> String {
    ranking
        .iter()
        .take(limit)
        .map(|score| format!("{} major: {}", score.tonic, score.match_count))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A text needle, e.g. `[----|--*-]`, for cents in [-50, 50].
pub fn needle(cents: f32, width: usize) -> String {
    let width = width.max(3) | 1;
    let center = width / 2;
    let offset = (cents.clamp(-50.0, 50.0) / 50.0 * center as f32).round() as isize;
    let pointer = (center as isize + offset) as usize;

    let body: String = (0..width)
        .map(|i| match i {
            _ if i == pointer => '*',
            _ if i == center => '|',
            _ => '-',
        })
        .collect();
    format!("[{body}]")
}

pub fn format_match(update: &TrackerUpdate, target: &str) -> String {
    let status = match update.reading.status {
        MatchStatus::Match => "in tune",
        MatchStatus::Close if update.reading.cents_off > 0.0 => "sharp",
        MatchStatus::Close => "flat",
        MatchStatus::Neutral => "other note",
    };
    let octave = match update.reading.octave_offset {
        0 => String::new(),
        n => format!(" ({n:+} oct)"),
    };
    format!(
        "{target}: {} {status}{octave} {:+.0}c",
        needle(update.needle_cents, 21),
        update.reading.cents_off
    )
}

/// Prints locks and pending candidates as they happen.
pub struct ConsoleObserver<W: Write> {
    out: W,
    locked: Vec<PitchClass>,
    verbose: bool,
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            locked: Vec::new(),
            verbose,
        }
    }

    /// Lock events in the order they fired.
    pub fn locked(&self) -> &[PitchClass] {
        &self.locked
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SessionObserver for ConsoleObserver<W> {
    fn on_frame(&mut self, note: Option<&Note>, _frequency_hz: f32) {
        if self.verbose {
            if let Some(note) = note {
                let _ = writeln!(self.out, "  {}", format_note(note));
            }
        }
    }

    fn on_note_locked(&mut self, pitch_class: PitchClass) {
        self.locked.push(pitch_class);
        let _ = writeln!(self.out, "locked {pitch_class}");
    }

    fn on_pending(&mut self, pending: Option<PitchClass>) {
        if self.verbose {
            if let Some(pitch_class) = pending {
                let _ = writeln!(self.out, "hearing {pitch_class}...");
            }
        }
    }
}
