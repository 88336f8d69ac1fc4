// Soundbank: note code to single-note clip lookup.
//
// A soundbank is a directory with one clip per recorded note, named by note
// (`c4.mp4`, `f#3.avi`, `bf2.mov`, ...) plus a mandatory `silence` clip used
// for rests and for stretching notes longer than their recording. Everything
// before the first `.` of the file name is the note name; files whose names
// do not parse are skipped with a warning.
//
// Clip durations come from the media probe once, at load time. The bank is
// immutable afterwards and shared read-only by every timeline compilation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use grid_video_score::{MIDI_CODES, Note, SILENCE_CODE, note_code, note_name};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::RenderError;
use crate::tool::MediaProbe;

/// A recorded clip and its length in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipHandle {
    pub path: PathBuf,
    pub duration: f64,
}

#[derive(Debug, Clone)]
pub struct Soundbank {
    clips: BTreeMap<i32, ClipHandle>,
}

impl Soundbank {
    /// Build a bank from `(code, clip)` pairs. The silence clip (code -1)
    /// must be present with a positive duration.
    pub fn from_clips(
        clips: impl IntoIterator<Item = (i32, ClipHandle)>,
    ) -> Result<Self, RenderError> {
        let clips: BTreeMap<i32, ClipHandle> = clips.into_iter().collect();
        match clips.get(&SILENCE_CODE) {
            None => return Err(RenderError::MissingSilenceClip(PathBuf::new())),
            Some(silence) if silence.duration <= 0.0 || !silence.duration.is_finite() => {
                return Err(RenderError::InvalidSilenceClip {
                    duration: silence.duration,
                });
            }
            Some(_) => {}
        }
        Ok(Soundbank { clips })
    }

    /// Scan `dir` for note clips, probing each one's duration.
    #[instrument(skip(dir, probe), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, probe: &dyn MediaProbe) -> Result<Self, RenderError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut clips = BTreeMap::new();
        for path in paths {
            let Some(code) = clip_code(&path) else {
                warn!(path = %path.display(), "skipping file with unparseable note name");
                continue;
            };
            let duration = probe.duration(&path)?;
            debug!(note = %note_name(code), duration, "loaded clip");
            let path = std::path::absolute(&path).unwrap_or(path);
            if let Some(previous) = clips.insert(code, ClipHandle { path, duration }) {
                warn!(
                    note = %note_name(code),
                    replaced = %previous.path.display(),
                    "two clips for the same note, keeping the later one"
                );
            }
        }

        let bank = Soundbank::from_clips(clips).map_err(|e| match e {
            RenderError::MissingSilenceClip(_) => {
                RenderError::MissingSilenceClip(dir.to_path_buf())
            }
            other => other,
        })?;
        info!(
            clips = bank.len(),
            boundaries = ?bank.boundaries().map(|(l, h)| (l.code, h.code)),
            "loaded soundbank"
        );
        Ok(bank)
    }

    /// The clip for `code`, or `NoteNotFound`.
    pub fn clip(&self, code: i32) -> Result<&ClipHandle, RenderError> {
        self.clips.get(&code).ok_or(RenderError::NoteNotFound(code))
    }

    pub fn silence(&self) -> &ClipHandle {
        // Presence is checked in `from_clips`.
        &self.clips[&SILENCE_CODE]
    }

    pub fn contains(&self, code: i32) -> bool {
        self.clips.contains_key(&code)
    }

    /// Number of clips, including silence.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Note codes with a clip, excluding silence, in ascending order.
    pub fn codes(&self) -> impl DoubleEndedIterator<Item = i32> + '_ {
        self.clips.keys().copied().filter(|&c| c != SILENCE_CODE)
    }

    /// The lowest and highest recorded notes. `None` if the bank holds only
    /// the silence clip.
    pub fn boundaries(&self) -> Option<(Note, Note)> {
        let low = self.codes().next()?;
        let high = self.codes().next_back()?;
        Some((Note::new(low, 0.0), Note::new(high, 0.0)))
    }
}

/// Note code encoded in a clip's file name, if any. Only silence and MIDI
/// notes `c-1` through `g9` count.
pub fn clip_code(path: &Path) -> Option<i32> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    note_code(stem)
        .ok()
        .filter(|&code| code == SILENCE_CODE || MIDI_CODES.contains(&code))
}
