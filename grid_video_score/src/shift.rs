// Octave shifting of voices into soundbank range.
//
// A soundbank only covers the notes someone recorded. When a voice reaches
// below or above that coverage, moving the whole voice by whole octaves keeps
// its melody intact while bringing it into range:
//
//   left  = bank_low  - track_low    (semitones the track sticks out below)
//   right = track_high - bank_high   (semitones it sticks out above)
//
// - both positive: the bank is narrower than the voice; nothing helps, warn.
//   This includes equal deficits, which give no direction to shift in.
// - both non-positive: the voice already fits.
// - otherwise shift `max(left, right) / 12 + 1` octaves toward the side with
//   the larger deficit, optionally capped. A cap of zero leaves the voice
//   where it is, reported as fitting.
//
// An alternative rounding, `(deficit + 6) / 12 + 1`, has also been used for
// this offset; it is not adopted here.
//
// Silence is never shifted. Only whole-octave correction exists; asking for
// semitone ("tone") correction is an error.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ScoreError;
use crate::note::Note;
use crate::track::{Track, TrackAggregate};

/// How a voice is transposed to fit the soundbank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftMode {
    /// Whole octaves only.
    #[default]
    Octave,
    /// Arbitrary semitones. Not implemented.
    Tone,
}

/// What autoshift did to one voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftOutcome {
    /// The voice has no sound to shift.
    Silent,
    /// The voice already lies within the bank, or a zero correction cap
    /// keeps it where it is.
    Fits,
    /// The voice was moved by this many octaves (negative is down).
    Shifted { octaves: i32 },
    /// The voice exceeds the bank on both sides and was left as is.
    SoundbankTooSmall { left_deficit: i32, right_deficit: i32 },
    /// The computed shift would leave the MIDI range; left as is.
    OutOfRange { octaves: i32 },
}

/// Decide the octave offset for a voice spanning `track` within a bank
/// spanning `bank`, both as inclusive `(low, high)` code ranges.
pub fn octave_offset(
    track: (i32, i32),
    bank: (i32, i32),
    max_correction: Option<u32>,
) -> ShiftOutcome {
    let left_deficit = bank.0 - track.0;
    let right_deficit = track.1 - bank.1;

    if left_deficit > 0 && right_deficit > 0 {
        return ShiftOutcome::SoundbankTooSmall {
            left_deficit,
            right_deficit,
        };
    }
    if left_deficit <= 0 && right_deficit <= 0 {
        return ShiftOutcome::Fits;
    }

    let cap = |octaves: i32| match max_correction {
        Some(max) => octaves.min(i32::try_from(max).unwrap_or(i32::MAX)),
        None => octaves,
    };
    // Exactly one deficit is positive here, so the two are never equal.
    let octaves = if left_deficit > right_deficit {
        cap(left_deficit / 12 + 1)
    } else {
        -cap(right_deficit / 12 + 1)
    };
    if octaves == 0 {
        ShiftOutcome::Fits
    } else {
        ShiftOutcome::Shifted { octaves }
    }
}

/// Shift one voice into the bank's `(low, high)` boundaries.
pub fn autoshift_track(
    track: &mut Track,
    bounds: (Note, Note),
    mode: ShiftMode,
    max_correction: Option<u32>,
) -> Result<ShiftOutcome, ScoreError> {
    if mode == ShiftMode::Tone {
        return Err(ScoreError::UnsupportedMode { mode: "tone" });
    }
    let Some(range) = track.range() else {
        return Ok(ShiftOutcome::Silent);
    };

    let outcome = match octave_offset(range, (bounds.0.code, bounds.1.code), max_correction) {
        ShiftOutcome::Shifted { octaves } => match track.shift(octaves * 12) {
            Ok(()) => ShiftOutcome::Shifted { octaves },
            Err(_) => ShiftOutcome::OutOfRange { octaves },
        },
        other => other,
    };
    Ok(outcome)
}

/// Shift every voice of `aggregate` independently. Returns one outcome per
/// voice, in order.
pub fn autoshift(
    aggregate: &mut TrackAggregate,
    bounds: (Note, Note),
    mode: ShiftMode,
    max_correction: Option<u32>,
) -> Result<Vec<ShiftOutcome>, ScoreError> {
    let mut outcomes = Vec::with_capacity(aggregate.len());
    aggregate.try_for_each_track_mut(|voice, track| -> Result<(), ScoreError> {
        let outcome = autoshift_track(track, bounds, mode, max_correction)?;
        match outcome {
            ShiftOutcome::Shifted { octaves } => info!(voice, octaves, "shifted voice"),
            ShiftOutcome::SoundbankTooSmall {
                left_deficit,
                right_deficit,
            } => warn!(
                voice,
                left_deficit, right_deficit, "soundbank too small for voice, leaving it unshifted"
            ),
            ShiftOutcome::OutOfRange { octaves } => warn!(
                voice,
                octaves, "octave shift would leave MIDI range, leaving voice unshifted"
            ),
            ShiftOutcome::Silent | ShiftOutcome::Fits => {}
        }
        outcomes.push(outcome);
        Ok(())
    })?;
    Ok(outcomes)
}
