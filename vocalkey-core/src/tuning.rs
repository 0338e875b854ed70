//! # Musical Tuning Module
//!
//! Equal-temperament note math for the singing pipeline: pitch classes,
//! frequency-to-note quantization and cent deviation.
//!
//! ## Features
//! - Twelve enumerated pitch classes in canonical C..B order
//! - Quantization of a frequency to the nearest note, octave and cents
//! - Equal temperament frequency calculations (A4 = 440 Hz)
//! - Octave-4 reference notes used as default singing targets

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Concert pitch for A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI note number of A4.
const A4_MIDI: i32 = 69;

/// One of the twelve equal-tempered note names, independent of octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    /// All pitch classes in canonical order, starting at C.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Position in the C-based table (C = 0, B = 11).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Maps any integer onto the 12-name table, wrapping in both directions.
    pub fn from_index(index: i32) -> PitchClass {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    /// The pitch class `semitones` above this one.
    pub fn transpose(self, semitones: i32) -> PitchClass {
        Self::from_index(self.index() as i32 + semitones)
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string is not a recognizable note name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized note name: {0:?}")]
pub struct ParseNoteError(pub String);

impl FromStr for PitchClass {
    type Err = ParseNoteError;

    /// Accepts naturals, sharps (`#`, `♯`) and flats (`b`, `♭`), e.g. "Bb".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let base = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(ParseNoteError(s.to_string())),
        };
        let mut offset = 0;
        for accidental in chars {
            match accidental {
                '#' | '♯' => offset += 1,
                'b' | '♭' => offset -= 1,
                _ => return Err(ParseNoteError(s.to_string())),
            }
        }
        Ok(PitchClass::from_index(base + offset))
    }
}

/// A frequency quantized to its nearest equal-tempered note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
    /// The measured frequency this note was derived from.
    pub frequency_hz: f32,
    /// Signed distance from the note's exact frequency; positive is sharp.
    pub cents_deviation: f32,
}

impl Note {
    /// Scientific pitch name, e.g. "A4" or "C#3".
    pub fn name(&self) -> String {
        format!("{}{}", self.pitch_class, self.octave)
    }

    /// The exact equal-tempered frequency of the quantized note.
    pub fn target_frequency(&self) -> f32 {
        frequency_of(self.pitch_class, self.octave)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} ({:+.0} cents)", self.pitch_class, self.octave, self.cents_deviation)
    }
}

/// Quantizes a frequency to the nearest equal-tempered note.
///
/// Semitones are counted from A4 and rounded half away from zero, so an exact
/// quarter-tone resolves to the note farther from A4 (-50 cents above A4,
/// +50 cents below it).
///
/// # Arguments
/// * `frequency` - Frequency in Hz; must be positive
///
/// # Returns
/// * `Note` - Pitch class, octave (MIDI-style, C4 = middle C) and cents deviation
pub fn quantize(frequency: f32) -> Note {
    let note_number = 12.0 * (frequency as f64 / A4_FREQUENCY as f64).log2();
    let rounded = note_number.round();
    let midi = rounded as i32 + A4_MIDI;

    Note {
        pitch_class: PitchClass::from_index(midi),
        octave: midi.div_euclid(12) - 1,
        frequency_hz: frequency,
        cents_deviation: ((note_number - rounded) * 100.0) as f32,
    }
}

/// Exact equal-tempered frequency for a pitch class in a given octave.
pub fn frequency_of(pitch_class: PitchClass, octave: i32) -> f32 {
    let midi = (octave + 1) * 12 + pitch_class.index() as i32;
    A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI) as f32 / 12.0)
}

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// A named target note with its equal-tempered frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceNote {
    pub pitch_class: PitchClass,
    pub octave: i32,
    pub frequency: f32,
}

/// The twelve octave-4 notes (C4 = 261.63 Hz through B4 = 493.88 Hz),
/// computed once at startup.
static REFERENCE_NOTES: Lazy<Vec<ReferenceNote>> = Lazy::new(|| {
    PitchClass::ALL
        .iter()
        .map(|&pitch_class| ReferenceNote {
            pitch_class,
            octave: 4,
            frequency: frequency_of(pitch_class, 4),
        })
        .collect()
});

/// Octave-4 reference notes in canonical order.
pub fn reference_notes() -> &'static [ReferenceNote] {
    &REFERENCE_NOTES
}

/// Parses a scientific pitch name such as "A4", "C#3" or "Bb2".
///
/// A missing octave defaults to 4.
pub fn parse_note_name(name: &str) -> Result<ReferenceNote, ParseNoteError> {
    let trimmed = name.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_digit() || c == '-')
        .unwrap_or(trimmed.len());
    let (class_part, octave_part) = trimmed.split_at(split);
    let pitch_class: PitchClass = class_part.parse()?;
    let octave = if octave_part.is_empty() {
        4
    } else {
        octave_part
            .parse()
            .map_err(|_| ParseNoteError(name.to_string()))?
    };

    Ok(ReferenceNote {
        pitch_class,
        octave,
        frequency: frequency_of(pitch_class, octave),
    })
}
