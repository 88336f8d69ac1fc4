// Voice allocation: polyphonic MIDI events to monophonic tracks.
//
// A MIDI track may hold any number of overlapping notes. The grid needs each
// cell to play one note at a time, so events are spread over voice slots:
//
// - A note start takes the first free slot in allocation order. If that slot
//   has been idle since its last note ended, the gap is filled with silence.
//   With no free slot, a new slot is allocated. New slots start idle at tick
//   0, so a voice that first enters late begins with leading silence.
// - A note end closes the busy slot holding the same (code, channel) and
//   emits the note. An end with no matching slot is dropped with a warning.
// - At end of stream, slots still busy are closed at the final tick.
//
// This first-fit assignment is not a minimal interval colouring, but it is
// deterministic and well-formed MIDI pairs note-on/note-off per channel, so
// it matches the voice count a human would read off the score in practice.
//
// The slot arena is plain data and `step` is a pure function of
// `(slots, event)`, which makes the allocation rules testable on their own.
// `VoiceAllocator` folds `step` over an event stream and collects the notes
// into one `Track` per slot.

use tracing::warn;

use crate::error::ScoreWarning;
use crate::note::Note;
use crate::track::{Track, TrackAggregate};

/// State of one voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Idle since `last_timestamp` (the tick its previous note ended).
    Free { last_timestamp: u64 },
    /// Holding a note that started at `last_timestamp`.
    Busy {
        code: u8,
        channel: u8,
        last_timestamp: u64,
    },
}

impl SlotState {
    pub fn last_timestamp(&self) -> u64 {
        match *self {
            SlotState::Free { last_timestamp } | SlotState::Busy { last_timestamp, .. } => {
                last_timestamp
            }
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, SlotState::Free { .. })
    }
}

/// A note boundary at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEvent {
    NoteStart { code: u8, channel: u8, tick: u64 },
    NoteEnd { code: u8, channel: u8, tick: u64 },
}

impl VoiceEvent {
    pub fn tick(&self) -> u64 {
        match *self {
            VoiceEvent::NoteStart { tick, .. } | VoiceEvent::NoteEnd { tick, .. } => tick,
        }
    }
}

/// Result of applying one event to the slot arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// The slot arena after the event. Never shorter than before.
    pub slots: Vec<SlotState>,
    /// Notes to append, as `(slot index, note)` in emission order.
    pub emitted: Vec<(usize, Note)>,
    /// True if the event was a note end with no matching busy slot.
    pub unmatched: bool,
}

/// Apply `event` to `slots`, returning the new arena and any emitted notes.
pub fn step(slots: &[SlotState], event: VoiceEvent, tick_seconds: f64) -> Step {
    let mut next = slots.to_vec();
    let mut emitted = Vec::new();
    let mut unmatched = false;

    match event {
        VoiceEvent::NoteStart {
            code,
            channel,
            tick,
        } => {
            let index = match next.iter().position(SlotState::is_free) {
                Some(index) => index,
                None => {
                    next.push(SlotState::Free { last_timestamp: 0 });
                    next.len() - 1
                }
            };
            let gap = tick.saturating_sub(next[index].last_timestamp());
            if gap > 0 {
                emitted.push((index, Note::silence(gap as f64 * tick_seconds)));
            }
            next[index] = SlotState::Busy {
                code,
                channel,
                last_timestamp: tick,
            };
        }
        VoiceEvent::NoteEnd {
            code,
            channel,
            tick,
        } => {
            let holder = next.iter().position(|slot| {
                matches!(
                    *slot,
                    SlotState::Busy { code: c, channel: ch, .. } if c == code && ch == channel
                )
            });
            match holder {
                Some(index) => {
                    let started = next[index].last_timestamp();
                    let length = tick.saturating_sub(started) as f64 * tick_seconds;
                    emitted.push((index, Note::new(i32::from(code), length)));
                    next[index] = SlotState::Free {
                        last_timestamp: tick,
                    };
                }
                None => unmatched = true,
            }
        }
    }

    Step {
        slots: next,
        emitted,
        unmatched,
    }
}

/// Folds `step` over an event stream, collecting one `Track` per slot.
#[derive(Debug, Clone)]
pub struct VoiceAllocator {
    tick_seconds: f64,
    slots: Vec<SlotState>,
    tracks: Vec<Track>,
    last_tick: u64,
    warnings: Vec<ScoreWarning>,
}

impl VoiceAllocator {
    pub fn new(tick_seconds: f64) -> Self {
        VoiceAllocator {
            tick_seconds,
            slots: Vec::new(),
            tracks: Vec::new(),
            last_tick: 0,
            warnings: Vec::new(),
        }
    }

    /// Record that the stream has reached `tick` without a note event (meta
    /// events, controllers). Used to find the final timestamp.
    pub fn advance_to(&mut self, tick: u64) {
        self.last_tick = self.last_tick.max(tick);
    }

    pub fn feed(&mut self, event: VoiceEvent) {
        self.advance_to(event.tick());
        let Step {
            slots,
            emitted,
            unmatched,
        } = step(&self.slots, event, self.tick_seconds);

        self.slots = slots;
        self.tracks.resize_with(self.slots.len(), Track::new);
        for (index, note) in emitted {
            self.tracks[index].push(note);
        }

        if unmatched {
            if let VoiceEvent::NoteEnd {
                code,
                channel,
                tick,
            } = event
            {
                warn!(code, channel, tick, "note end without a matching note start, dropping it");
                self.warnings.push(ScoreWarning::MalformedEvent {
                    code,
                    channel,
                    tick,
                });
            }
        }
    }

    /// Close any still-sounding notes at the final tick and return the voices,
    /// padded to a common duration, with the warnings raised along the way.
    pub fn finish(mut self) -> (TrackAggregate, Vec<ScoreWarning>) {
        let end = self.last_tick;
        let open: Vec<VoiceEvent> = self
            .slots
            .iter()
            .filter_map(|slot| match *slot {
                SlotState::Busy { code, channel, .. } => Some(VoiceEvent::NoteEnd {
                    code,
                    channel,
                    tick: end,
                }),
                SlotState::Free { .. } => None,
            })
            .collect();
        for event in open {
            self.feed(event);
        }

        let mut aggregate = TrackAggregate::from_tracks(self.tracks);
        // Voices come straight from one timeline, so none can be longer than
        // the longest; padding cannot fail.
        if let Err(e) = aggregate.pad_to_longest() {
            warn!(error = %e, "failed to pad voices");
        }
        (aggregate, self.warnings)
    }
}

/// Allocate voices for a complete event stream.
pub fn allocate_voices(
    events: impl IntoIterator<Item = VoiceEvent>,
    tick_seconds: f64,
) -> (TrackAggregate, Vec<ScoreWarning>) {
    let mut allocator = VoiceAllocator::new(tick_seconds);
    for event in events {
        allocator.feed(event);
    }
    allocator.finish()
}
