// Notes and note naming.
//
// A `Note` is a MIDI note code plus a length in seconds. Code -1 is reserved
// for silence. Notes compare and order by code alone, so a note pool or a
// range query ignores how long each note sounds.
//
// Note names are the lowercase scientific spelling used for soundbank file
// names: a letter, an optional accidental, and a signed octave number, e.g.
// `c4` (60), `f#3` (54), `c-1` (0). Sharps are the canonical spelling; the
// flats `df ef gf af bf` are accepted when parsing. The literal name
// `silence` maps to code -1.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;

/// Note code reserved for silence.
pub const SILENCE_CODE: i32 = -1;

/// Name of the silence note (and of the soundbank's silence clip).
pub const SILENCE_NAME: &str = "silence";

/// Codes a MIDI note can take, `c-1` through `g9`.
pub const MIDI_CODES: std::ops::RangeInclusive<i32> = 0..=127;

/// Canonical names of the twelve pitch classes, indexed by semitone.
const PITCH_CLASS_NAMES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

/// Every accepted spelling and its semitone offset from C.
const SPELLINGS: [(&str, i32); 17] = [
    ("c", 0),
    ("c#", 1),
    ("df", 1),
    ("d", 2),
    ("d#", 3),
    ("ef", 3),
    ("e", 4),
    ("f", 5),
    ("f#", 6),
    ("gf", 6),
    ("g", 7),
    ("g#", 8),
    ("af", 8),
    ("a", 9),
    ("a#", 10),
    ("bf", 10),
    ("b", 11),
];

/// A single sound (or silence) with a length in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Note {
    /// MIDI note code, or `SILENCE_CODE`.
    pub code: i32,
    /// Length in seconds. Never negative.
    pub length: f64,
}

impl Note {
    pub fn new(code: i32, length: f64) -> Self {
        Note {
            code,
            length: length.max(0.0),
        }
    }

    pub fn silence(length: f64) -> Self {
        Note::new(SILENCE_CODE, length)
    }

    pub fn is_silence(&self) -> bool {
        self.code == SILENCE_CODE
    }

    pub fn name(&self) -> String {
        note_name(self.code)
    }

    /// Transpose by `semitones`. Silence is returned unchanged.
    pub fn shifted(self, semitones: i32) -> Self {
        if self.is_silence() {
            self
        } else {
            Note {
                code: self.code + semitones,
                length: self.length,
            }
        }
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Note {}

impl PartialOrd for Note {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Note {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code.cmp(&other.code)
    }
}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

/// Name of a note code, e.g. `note_name(60) == "c4"`.
pub fn note_name(code: i32) -> String {
    if code == SILENCE_CODE {
        return SILENCE_NAME.to_string();
    }
    let octave = code.div_euclid(12) - 1;
    let pitch_class = code.rem_euclid(12) as usize;
    format!("{}{}", PITCH_CLASS_NAMES[pitch_class], octave)
}

/// Parse a note name into its code. Case-insensitive. Names outside the MIDI
/// range (`c-1` to `g9`) are rejected.
pub fn note_code(name: &str) -> Result<i32, ScoreError> {
    let lower = name.trim().to_ascii_lowercase();
    if lower == SILENCE_NAME {
        return Ok(SILENCE_CODE);
    }
    let invalid = || ScoreError::InvalidNoteName(name.to_string());

    let mut chars = lower.char_indices();
    match chars.next() {
        Some((_, 'a'..='g')) => {}
        _ => return Err(invalid()),
    }
    // The spelling is the letter plus an optional `#` or `f` accidental.
    let spelling_end = match chars.next() {
        Some((i, '#' | 'f')) => i + 1,
        Some((i, _)) => i,
        None => return Err(invalid()),
    };
    let (spelling, octave) = lower.split_at(spelling_end);

    let semitone = SPELLINGS
        .iter()
        .find(|(s, _)| *s == spelling)
        .map(|&(_, semitone)| semitone)
        .ok_or_else(invalid)?;
    let octave: i32 = octave.parse().map_err(|_| invalid())?;

    octave
        .checked_add(1)
        .and_then(|o| o.checked_mul(12))
        .and_then(|base| base.checked_add(semitone))
        .filter(|code| MIDI_CODES.contains(code))
        .ok_or_else(invalid)
}
