// Grid Video score model
//
// Turns a polyphonic MIDI file into a set of strictly monophonic voices, one
// per grid cell of the final video. Each voice is a `Track` of notes and
// silences that never overlap; all voices of a score share one duration.
//
// Architecture:
// - note.rs: `Note` (code + length) and note-name <-> code conversion
// - track.rs: `Track` (one voice) and `TrackAggregate` (voices that sound
//   together), duration padding
// - tempo.rs: constant tick-to-seconds factor from the tempo meta-event
// - voices.rs: first-fit voice allocator over note start/end events
// - midi.rs: SMF reading via `midly`, per-track allocation, merging
// - shift.rs: whole-octave transposition of voices into soundbank range
// - error.rs: fatal `ScoreError`s and recovered `ScoreWarning`s
//
// Rendering lives in `grid_video_render`, which depends on this crate.

pub mod error;
pub mod midi;
pub mod note;
pub mod shift;
pub mod tempo;
pub mod track;
pub mod voices;

pub use error::{ScoreError, ScoreWarning};
pub use midi::{Score, parse_midi, read_midi};
pub use note::{MIDI_CODES, Note, SILENCE_CODE, note_code, note_name};
pub use shift::{ShiftMode, ShiftOutcome, autoshift};
pub use track::{Track, TrackAggregate};
