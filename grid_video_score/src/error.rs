// Error and warning types for score parsing.
//
// `ScoreError` covers the structural failures that abort parsing outright:
// a file with no tempo in its first track, SMPTE timing, an unreadable file,
// or an octave correction mode that is not implemented. Data-quality
// anomalies that parsing recovers from (an unmatched note-off, for instance)
// are reported as `ScoreWarning` values alongside the result instead, and
// are also emitted as `tracing` warnings at the point they occur.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("no tempo event found in the first track")]
    MissingTempo,

    #[error("unsupported MIDI timing: only metrical (ticks per beat) timing is supported")]
    UnsupportedTiming,

    #[error("ticks per beat must be non-zero")]
    ZeroTicksPerBeat,

    #[error("invalid note name '{0}'")]
    InvalidNoteName(String),

    #[error("{mode} correction mode is not implemented")]
    UnsupportedMode { mode: &'static str },

    #[error("track is {excess:.6}s longer than the requested duration")]
    TrackTooLong { excess: f64 },

    #[error("shifting by {semitones} semitones moves note {code} outside the MIDI range")]
    ShiftOutOfRange { code: i32, semitones: i32 },

    #[error("failed to parse MIDI data: {0}")]
    Midi(#[from] midly::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A recovered anomaly encountered while parsing a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreWarning {
    /// A note-end event with no busy voice holding that note. The event was
    /// dropped.
    MalformedEvent { code: u8, channel: u8, tick: u64 },
}
