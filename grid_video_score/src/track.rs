// Monophonic voice tracks and their aggregates.
//
// A `Track` is one voice: an ordered run of notes that never overlap, where
// silence notes fill the gaps. It keeps its total duration, pitch extremes,
// and pool of distinct codes up to date as notes are pushed, so range
// queries during octave shifting and soundbank coverage checks are O(1).
//
// A `TrackAggregate` groups the voices that sound together (one MIDI track,
// or the whole file after merging). Voices only line up in the grid if they
// all last equally long, so aggregates are padded with trailing silence up to
// their longest voice.
//
// See also: `voices.rs`, which builds aggregates from MIDI events, and
// `shift.rs`, which transposes tracks in place.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::note::{MIDI_CODES, Note};

/// Durations closer than this are considered equal when padding.
pub const PAD_ACCURACY: f64 = 1e-6;

/// A monophonic sequence of notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    notes: Vec<Note>,
    total_duration: f64,
    lowest_note: Option<i32>,
    highest_note: Option<i32>,
    note_pool: BTreeSet<i32>,
}

impl Track {
    pub fn new() -> Self {
        Track::default()
    }

    pub fn from_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let mut track = Track::new();
        for note in notes {
            track.push(note);
        }
        track
    }

    /// Append a note, updating duration and pitch statistics.
    pub fn push(&mut self, note: Note) {
        self.total_duration += note.length;
        if !note.is_silence() {
            self.note_pool.insert(note.code);
            if self.lowest_note.is_none_or(|low| note.code < low) {
                self.lowest_note = Some(note.code);
            }
            if self.highest_note.is_none_or(|high| note.code > high) {
                self.highest_note = Some(note.code);
            }
        }
        self.notes.push(note);
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// True if at least one non-silence note is present.
    pub fn has_sound(&self) -> bool {
        !self.note_pool.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Sum of the lengths of all non-silence notes.
    pub fn total_sound_length(&self) -> f64 {
        self.notes
            .iter()
            .filter(|n| !n.is_silence())
            .map(|n| n.length)
            .sum()
    }

    pub fn lowest_note(&self) -> Option<i32> {
        self.lowest_note
    }

    pub fn highest_note(&self) -> Option<i32> {
        self.highest_note
    }

    /// `(lowest, highest)` non-silence codes, if the track has any sound.
    pub fn range(&self) -> Option<(i32, i32)> {
        self.lowest_note.zip(self.highest_note)
    }

    pub fn note_pool(&self) -> &BTreeSet<i32> {
        &self.note_pool
    }

    /// Append trailing silence so the track lasts exactly `duration` seconds.
    ///
    /// Within `PAD_ACCURACY` of the target this does nothing. A track already
    /// longer than the target is an error.
    pub fn pad_to_duration(&mut self, duration: f64) -> Result<(), ScoreError> {
        let pad = duration - self.total_duration;
        if pad < -PAD_ACCURACY {
            return Err(ScoreError::TrackTooLong { excess: -pad });
        }
        if pad >= PAD_ACCURACY {
            self.push(Note::silence(pad));
        }
        Ok(())
    }

    /// Transpose every non-silence note by `semitones`.
    ///
    /// All-or-nothing: if any note would leave the MIDI range 0..=127 the
    /// track is left untouched.
    pub fn shift(&mut self, semitones: i32) -> Result<(), ScoreError> {
        if let Some(&code) = self
            .note_pool
            .iter()
            .find(|&&code| !MIDI_CODES.contains(&(code + semitones)))
        {
            return Err(ScoreError::ShiftOutOfRange { code, semitones });
        }
        let notes = std::mem::take(&mut self.notes);
        *self = Track::from_notes(notes.into_iter().map(|n| n.shifted(semitones)));
        Ok(())
    }
}

/// The set of simultaneously sounding voices extracted from a score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackAggregate {
    tracks: Vec<Track>,
    lowest_note: Option<i32>,
    highest_note: Option<i32>,
    note_pool: BTreeSet<i32>,
}

impl TrackAggregate {
    pub fn new() -> Self {
        TrackAggregate::default()
    }

    pub fn from_tracks(tracks: impl IntoIterator<Item = Track>) -> Self {
        let mut aggregate = TrackAggregate::new();
        for track in tracks {
            aggregate.push(track);
        }
        aggregate
    }

    pub fn push(&mut self, track: Track) {
        self.absorb_stats(&track);
        self.tracks.push(track);
    }

    /// Move all voices of `other` into this aggregate.
    pub fn merge(&mut self, other: TrackAggregate) {
        for track in other.tracks {
            self.push(track);
        }
    }

    fn absorb_stats(&mut self, track: &Track) {
        if let Some(low) = track.lowest_note {
            if self.lowest_note.is_none_or(|l| low < l) {
                self.lowest_note = Some(low);
            }
        }
        if let Some(high) = track.highest_note {
            if self.highest_note.is_none_or(|h| high > h) {
                self.highest_note = Some(high);
            }
        }
        self.note_pool.extend(track.note_pool.iter().copied());
    }

    fn recompute_stats(&mut self) {
        self.lowest_note = None;
        self.highest_note = None;
        self.note_pool.clear();
        let tracks = std::mem::take(&mut self.tracks);
        for track in &tracks {
            self.absorb_stats(track);
        }
        self.tracks = tracks;
    }

    /// Apply `f` to every voice in order, then refresh the aggregate's pitch
    /// statistics. Stops at the first error; voices already visited keep
    /// their changes.
    pub fn try_for_each_track_mut<E>(
        &mut self,
        mut f: impl FnMut(usize, &mut Track) -> Result<(), E>,
    ) -> Result<(), E> {
        let result = self
            .tracks
            .iter_mut()
            .enumerate()
            .try_for_each(|(i, track)| f(i, track));
        self.recompute_stats();
        result
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if no voice contains any note at all.
    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(Track::is_empty)
    }

    pub fn lowest_note(&self) -> Option<i32> {
        self.lowest_note
    }

    pub fn highest_note(&self) -> Option<i32> {
        self.highest_note
    }

    pub fn note_pool(&self) -> &BTreeSet<i32> {
        &self.note_pool
    }

    /// Duration of the longest voice.
    pub fn max_duration(&self) -> f64 {
        self.tracks
            .iter()
            .map(Track::total_duration)
            .fold(0.0, f64::max)
    }

    pub fn pad_to_duration(&mut self, duration: f64) -> Result<(), ScoreError> {
        for track in &mut self.tracks {
            track.pad_to_duration(duration)?;
        }
        Ok(())
    }

    /// Pad every voice to the longest one. Returns the common duration.
    pub fn pad_to_longest(&mut self) -> Result<f64, ScoreError> {
        let duration = self.max_duration();
        self.pad_to_duration(duration)?;
        Ok(duration)
    }
}
