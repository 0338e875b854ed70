//! # Key Inference Module
//!
//! Infers the major key of a sung melody from the distinct pitch classes that
//! locked during a session. Each of the twelve major scales is scored by how
//! many of the locked notes it contains; there is no weighting by duration,
//! recency or scale degree, so results are deterministic and cheap to compute
//! on every request.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::tuning::PitchClass;

/// Semitone steps of the major scale from its tonic.
pub const MAJOR_SCALE_INTERVALS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Fewer distinct notes than this cannot distinguish keys.
pub const MIN_KEY_EVIDENCE: usize = 3;

/// The distinct pitch classes locked during one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedNoteSet {
    notes: BTreeSet<PitchClass>,
}

impl LockedNoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pitch class; returns `false` if it was already present.
    pub fn insert(&mut self, pitch_class: PitchClass) -> bool {
        self.notes.insert(pitch_class)
    }

    pub fn contains(&self, pitch_class: PitchClass) -> bool {
        self.notes.contains(&pitch_class)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    /// Pitch classes in canonical C..B order.
    pub fn iter(&self) -> impl Iterator<Item = PitchClass> + '_ {
        self.notes.iter().copied()
    }
}

impl FromIterator<PitchClass> for LockedNoteSet {
    fn from_iter<I: IntoIterator<Item = PitchClass>>(iter: I) -> Self {
        Self {
            notes: iter.into_iter().collect(),
        }
    }
}

impl Extend<PitchClass> for LockedNoteSet {
    fn extend<I: IntoIterator<Item = PitchClass>>(&mut self, iter: I) {
        self.notes.extend(iter);
    }
}

/// One major-key hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCandidate {
    pub tonic: PitchClass,
    /// Scale degrees one through seven.
    pub scale_notes: [PitchClass; 7],
}

impl KeyCandidate {
    pub fn major(tonic: PitchClass) -> Self {
        Self {
            tonic,
            scale_notes: MAJOR_SCALE_INTERVALS.map(|interval| tonic.transpose(interval)),
        }
    }

    pub fn contains(&self, pitch_class: PitchClass) -> bool {
        self.scale_notes.contains(&pitch_class)
    }

    /// Number of notes in `notes` that belong to this scale.
    pub fn match_count(&self, notes: &LockedNoteSet) -> usize {
        notes.iter().filter(|&note| self.contains(note)).count()
    }
}

/// The twelve major scales in canonical tonic order C..B, built once.
pub static KEY_CANDIDATES: Lazy<[KeyCandidate; 12]> =
    Lazy::new(|| PitchClass::ALL.map(KeyCandidate::major));

/// The answer to one key-inference query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyResult {
    /// `None` when there was too little evidence.
    pub tonic: Option<PitchClass>,
    pub match_count: usize,
}

impl KeyResult {
    pub const UNKNOWN: KeyResult = KeyResult {
        tonic: None,
        match_count: 0,
    };
}

/// A candidate with its score, as listed by [`rank_keys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyScore {
    pub tonic: PitchClass,
    pub match_count: usize,
}

/// Picks the major key that contains the most locked notes.
///
/// Ties go to the candidate whose tonic comes first in C..B order.
///
/// # Returns
/// * `KeyResult` - Best tonic and its match count, or [`KeyResult::UNKNOWN`]
///   when fewer than three notes were locked
pub fn best_key(notes: &LockedNoteSet) -> KeyResult {
    if notes.len() < MIN_KEY_EVIDENCE {
        return KeyResult::UNKNOWN;
    }

    let mut best = KeyResult::UNKNOWN;
    for candidate in KEY_CANDIDATES.iter() {
        let matches = candidate.match_count(notes);
        if matches > best.match_count {
            best = KeyResult {
                tonic: Some(candidate.tonic),
                match_count: matches,
            };
        }
    }
    best
}

/// Scores every candidate, best first, keeping C..B order among equals.
pub fn rank_keys(notes: &LockedNoteSet) -> Vec<KeyScore> {
    let mut scores: Vec<KeyScore> = KEY_CANDIDATES
        .iter()
        .map(|candidate| KeyScore {
            tonic: candidate.tonic,
            match_count: candidate.match_count(notes),
        })
        .collect();
    // sort_by is stable
    scores.sort_by(|a, b| b.match_count.cmp(&a.match_count));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use PitchClass::*;

    fn set(notes: &[PitchClass]) -> LockedNoteSet {
        notes.iter().copied().collect()
    }

    #[test]
    fn candidates_follow_major_pattern() {
        assert_eq!(KEY_CANDIDATES[0].scale_notes, [C, D, E, F, G, A, B]);
        assert_eq!(
            KEY_CANDIDATES[7].scale_notes,
            [G, A, B, C, D, E, FSharp]
        );
        assert_eq!(
            KEY_CANDIDATES[10].scale_notes,
            [ASharp, C, D, DSharp, F, G, A]
        );
        for (candidate, tonic) in KEY_CANDIDATES.iter().zip(PitchClass::ALL) {
            assert_eq!(candidate.tonic, tonic);
        }
    }

    #[test]
    fn white_keys_are_c_major() {
        let result = best_key(&set(&[C, D, E, F, G, A, B]));
        assert_eq!(result, KeyResult { tonic: Some(C), match_count: 7 });
    }

    #[test]
    fn too_few_notes_is_unknown() {
        assert_eq!(best_key(&set(&[C, G])), KeyResult::UNKNOWN);
        assert_eq!(best_key(&set(&[FSharp, B])), KeyResult::UNKNOWN);
        assert_eq!(best_key(&LockedNoteSet::new()), KeyResult::UNKNOWN);
    }

    #[test]
    fn ties_resolve_to_earlier_tonic() {
        // {C, D, E} lies in C, G and F major; C comes first.
        let result = best_key(&set(&[C, D, E]));
        assert_eq!(result, KeyResult { tonic: Some(C), match_count: 3 });

        // {D, E, F#, A} lies in D, G and A major; D comes first.
        let result = best_key(&set(&[D, E, FSharp, A]));
        assert_eq!(result.tonic, Some(D));
        assert_eq!(result.match_count, 4);
    }

    #[test]
    fn sharp_key_wins_with_its_accidental() {
        let result = best_key(&set(&[G, A, B, C, D, E, FSharp]));
        assert_eq!(result, KeyResult { tonic: Some(G), match_count: 7 });
    }

    #[test]
    fn duplicates_collapse() {
        let mut notes = LockedNoteSet::new();
        assert!(notes.insert(E));
        assert!(!notes.insert(E));
        notes.extend([E, GSharp, B]);
        assert_eq!(notes.len(), 3);
        assert_eq!(best_key(&notes), KeyResult { tonic: Some(E), match_count: 3 });
    }

    #[test]
    fn ranking_is_best_first_and_stable() {
        let ranking = rank_keys(&set(&[C, D, E]));
        assert_eq!(ranking.len(), 12);
        let leaders: Vec<_> = ranking.iter().take(3).map(|s| s.tonic).collect();
        assert_eq!(leaders, vec![C, F, G]);
        assert!(ranking.iter().all(|s| s.match_count <= 3));
        assert_eq!(ranking[0].tonic, best_key(&set(&[C, D, E])).tonic.unwrap());
    }
}
