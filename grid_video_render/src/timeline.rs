// Timeline compiler.
//
// Turns a voice (`Track`) into the ordered list of clip segments that, played
// back to back, perform it with the soundbank:
//
// - A note whose clip is at least as long as the note plays `[0, length)` of
//   its clip.
// - A longer note plays its whole clip, then is held with whole silence clips
//   while more than one silence clip of time remains, then a partial one.
// - A note the bank lacks is performed as silence of the same length, and
//   its code is recorded in `Timeline::substituted`.
// - Zero-length notes produce nothing.
//
// Segment durations therefore sum to the track's total duration. Lengths
// within `PAD_ACCURACY` of a clip's duration count as fitting it, so float
// noise never produces a sliver segment. Compiling only reads the soundbank,
// so many voices compile in parallel.

use std::collections::BTreeSet;
use std::path::PathBuf;

use grid_video_score::track::PAD_ACCURACY;
use grid_video_score::{Note, Track};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::soundbank::Soundbank;

/// `[in_point, out_point)` seconds of one clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub clip: PathBuf,
    pub in_point: f64,
    pub out_point: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.out_point - self.in_point
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    pub segments: Vec<Segment>,
    /// Note codes the bank lacked, performed as silence instead.
    pub substituted: BTreeSet<i32>,
    /// Seconds of actual sound in the source voice; used to order cells.
    pub sound_length: f64,
}

impl Timeline {
    pub fn duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    /// A timeline of nothing but silence, `duration` seconds long.
    pub fn silence(duration: f64, bank: &Soundbank) -> Self {
        compile_track(&Track::from_notes([Note::silence(duration)]), bank)
    }
}

pub fn compile_track(track: &Track, bank: &Soundbank) -> Timeline {
    let silence = bank.silence();
    let mut timeline = Timeline {
        sound_length: track.total_sound_length(),
        ..Timeline::default()
    };

    for note in track.notes().iter().filter(|n| n.length > 0.0) {
        let clip = match bank.clip(note.code) {
            Ok(clip) => clip,
            Err(_) => {
                if timeline.substituted.insert(note.code) {
                    warn!(note = %note.name(), "soundbank has no clip for note, using silence");
                }
                silence
            }
        };

        if clip.duration + PAD_ACCURACY >= note.length {
            timeline.segments.push(Segment {
                clip: clip.path.clone(),
                in_point: 0.0,
                out_point: note.length,
            });
            continue;
        }

        timeline.segments.push(Segment {
            clip: clip.path.clone(),
            in_point: 0.0,
            out_point: clip.duration,
        });
        let mut remaining = note.length - clip.duration;
        while remaining > silence.duration + PAD_ACCURACY {
            timeline.segments.push(Segment {
                clip: silence.path.clone(),
                in_point: 0.0,
                out_point: silence.duration,
            });
            remaining -= silence.duration;
        }
        if remaining > 0.0 {
            timeline.segments.push(Segment {
                clip: silence.path.clone(),
                in_point: 0.0,
                out_point: remaining,
            });
        }
    }

    debug!(
        segments = timeline.segments.len(),
        duration = timeline.duration(),
        "compiled timeline"
    );
    timeline
}

/// Compile every track, in parallel. Output order matches input order.
pub fn compile_tracks(tracks: &[Track], bank: &Soundbank) -> Vec<Timeline> {
    tracks.par_iter().map(|track| compile_track(track, bank)).collect()
}
