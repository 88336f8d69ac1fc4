// MIDI file input.
//
// Reads a Standard MIDI File with `midly`, resolves the constant tick length
// from track 0, and runs every track through the voice allocator. Each MIDI
// track yields one `TrackAggregate`; `Score::into_merged` then folds the
// non-empty ones into a single aggregate padded to the longest voice, which
// is what the grid renderer consumes.
//
// Event timestamps in SMF are deltas; they are accumulated into absolute
// ticks here. A note-on with velocity 0 is a note-off.

use std::path::Path;

use midly::{MidiMessage, Smf, TrackEvent, TrackEventKind};
use tracing::{debug, info, instrument};

use crate::error::{ScoreError, ScoreWarning};
use crate::tempo::resolve_tick_seconds;
use crate::track::TrackAggregate;
use crate::voices::{VoiceAllocator, VoiceEvent};

/// A parsed score: one voice aggregate per MIDI track.
#[derive(Debug, Clone)]
pub struct Score {
    /// Seconds per MIDI tick.
    pub tick_seconds: f64,
    /// Voices extracted from each MIDI track, in file order. Tracks without
    /// notes (such as a tempo-only track 0) give empty aggregates.
    pub tracks: Vec<TrackAggregate>,
    /// Recovered anomalies from all tracks.
    pub warnings: Vec<ScoreWarning>,
}

impl Score {
    /// Total number of voices across all tracks.
    pub fn voice_count(&self) -> usize {
        self.tracks.iter().map(TrackAggregate::len).sum()
    }

    /// Merge all non-empty track aggregates into one, padded so every voice
    /// lasts as long as the longest.
    pub fn into_merged(self) -> Result<TrackAggregate, ScoreError> {
        let mut merged = TrackAggregate::new();
        for aggregate in self.tracks.into_iter().filter(|a| !a.is_empty()) {
            merged.merge(aggregate);
        }
        merged.pad_to_longest()?;
        Ok(merged)
    }
}

/// Read and parse a MIDI file from disk.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn read_midi(path: &Path) -> Result<Score, ScoreError> {
    let bytes = std::fs::read(path).map_err(|source| ScoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_midi(&bytes)
}

/// Parse an in-memory MIDI file.
pub fn parse_midi(bytes: &[u8]) -> Result<Score, ScoreError> {
    let smf = Smf::parse(bytes)?;
    let first_track = smf.tracks.first().ok_or(ScoreError::MissingTempo)?;
    let tick_seconds = resolve_tick_seconds(&smf.header.timing, first_track)?;
    debug!(tick_seconds, tracks = smf.tracks.len(), "resolved tempo");

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    let mut warnings = Vec::new();
    for (index, events) in smf.tracks.iter().enumerate() {
        let (aggregate, track_warnings) = parse_track(events, tick_seconds);
        debug!(track = index, voices = aggregate.len(), "parsed track");
        tracks.push(aggregate);
        warnings.extend(track_warnings);
    }

    let score = Score {
        tick_seconds,
        tracks,
        warnings,
    };
    info!(
        voices = score.voice_count(),
        warnings = score.warnings.len(),
        "parsed MIDI score"
    );
    Ok(score)
}

/// Run one MIDI track's events through the voice allocator.
pub fn parse_track(
    events: &[TrackEvent],
    tick_seconds: f64,
) -> (TrackAggregate, Vec<ScoreWarning>) {
    let mut allocator = VoiceAllocator::new(tick_seconds);
    let mut tick: u64 = 0;
    for event in events {
        tick += u64::from(event.delta.as_int());
        match voice_event(&event.kind, tick) {
            Some(note_event) => allocator.feed(note_event),
            None => allocator.advance_to(tick),
        }
    }
    allocator.finish()
}

/// Classify a track event as a note start, note end, or neither.
pub fn voice_event(kind: &TrackEventKind, tick: u64) -> Option<VoiceEvent> {
    let TrackEventKind::Midi { channel, message } = *kind else {
        return None;
    };
    let channel = channel.as_int();
    match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => Some(VoiceEvent::NoteStart {
            code: key.as_int(),
            channel,
            tick,
        }),
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            Some(VoiceEvent::NoteEnd {
                code: key.as_int(),
                channel,
                tick,
            })
        }
        _ => None,
    }
}
