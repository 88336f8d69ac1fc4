// End-to-end pipeline: MIDI file + soundbank directory -> grid video.
//
//   read MIDI -> one aggregate per MIDI track -> drop empty ones -> merge
//   -> autoshift each voice into the bank's range (optional)
//   -> pad every voice to the common duration
//   -> compile timelines (parallel) -> order busiest first -> lay out grid
//   -> evaluate the render graph into the output file
//
// Intermediates go to a temporary work directory that is removed afterwards,
// unless the config names a work directory or asks to keep intermediates.
// `check_coverage` runs the same front half and reports which notes the
// soundbank is missing, without rendering.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use grid_video_score::{ScoreWarning, ShiftOutcome, TrackAggregate, autoshift, read_midi};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::evaluate::Evaluator;
use crate::layout::{GridLayout, build_grid_graph, grid_size, order_by_sound_length};
use crate::soundbank::Soundbank;
use crate::timeline::{Timeline, compile_tracks};
use crate::tool::{MediaProbe, RenderTool};

/// Voices ready for rendering, plus what happened to them on the way.
#[derive(Debug, Clone)]
pub struct PreparedScore {
    pub voices: TrackAggregate,
    pub shifts: Vec<ShiftOutcome>,
    pub warnings: Vec<ScoreWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderSummary {
    pub output: PathBuf,
    pub voices: usize,
    pub grid: GridLayout,
    pub duration: f64,
    pub shifts: Vec<ShiftOutcome>,
    pub warnings: Vec<ScoreWarning>,
    /// Notes the bank lacked, rendered as silence.
    pub substituted: BTreeSet<i32>,
    pub invocations: usize,
    /// Set when intermediates were left on disk.
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub voices: usize,
    pub shifts: Vec<ShiftOutcome>,
    /// Note codes the score needs that the bank has no clip for.
    pub missing: BTreeSet<i32>,
}

/// Non-silence codes used by `voices` that `bank` has no clip for.
pub fn coverage(voices: &TrackAggregate, bank: &Soundbank) -> BTreeSet<i32> {
    voices
        .note_pool()
        .iter()
        .copied()
        .filter(|&code| !bank.contains(code))
        .collect()
}

/// Read `midi` and bring its voices into the shape the grid needs.
pub fn prepare_score(
    midi: &Path,
    bank: &Soundbank,
    config: &RenderConfig,
) -> Result<PreparedScore, RenderError> {
    let score = read_midi(midi)?;
    let warnings = score.warnings.clone();
    let mut voices = score.into_merged()?;
    if voices.is_empty() {
        return Err(RenderError::NothingToRender);
    }

    let shifts = match bank.boundaries() {
        Some(bounds) if config.autoshift => autoshift(
            &mut voices,
            bounds,
            config.shift_mode,
            config.max_octave_correction,
        )?,
        None if config.autoshift => {
            warn!("soundbank has no note clips, skipping autoshift");
            Vec::new()
        }
        _ => Vec::new(),
    };
    let duration = voices.pad_to_longest()?;
    info!(voices = voices.len(), duration, "score prepared");
    Ok(PreparedScore {
        voices,
        shifts,
        warnings,
    })
}

/// Report which notes of `midi` the soundbank in `soundbank_dir` lacks.
#[instrument(skip_all, fields(midi = %midi.display()))]
pub fn check_coverage(
    midi: &Path,
    soundbank_dir: &Path,
    config: &RenderConfig,
    probe: &dyn MediaProbe,
) -> Result<CoverageReport, RenderError> {
    let bank = Soundbank::load(soundbank_dir, probe)?;
    let prepared = prepare_score(midi, &bank, config)?;
    let missing = coverage(&prepared.voices, &bank);
    info!(missing = missing.len(), "coverage checked");
    Ok(CoverageReport {
        voices: prepared.voices.len(),
        shifts: prepared.shifts,
        missing,
    })
}

/// Render `midi` with the clips in `soundbank_dir` into a grid video at
/// `output`.
#[instrument(skip_all, fields(midi = %midi.display(), output = %output.display()))]
pub fn make_grid_video<T: RenderTool + MediaProbe>(
    midi: &Path,
    soundbank_dir: &Path,
    output: &Path,
    config: &RenderConfig,
    tool: &mut T,
) -> Result<RenderSummary, RenderError> {
    let bank = Soundbank::load(soundbank_dir, &*tool)?;
    let prepared = prepare_score(midi, &bank, config)?;

    let mut timelines = compile_tracks(prepared.voices.tracks(), &bank);
    order_by_sound_length(&mut timelines);
    let duration = prepared.voices.max_duration();
    let padding = Timeline::silence(duration, &bank);
    let substituted: BTreeSet<i32> = timelines
        .iter()
        .flat_map(|t| t.substituted.iter().copied())
        .collect();

    let (cell_width, cell_height) = match config.cell_size() {
        Some(size) => size,
        None => {
            let (width, height) = tool.resolution(&bank.silence().path)?;
            let size = grid_size(timelines.len()).max(1) as u32;
            ((width / size).max(1), (height / size).max(1))
        }
    };
    let layout = GridLayout::new(timelines.len(), cell_width, cell_height);
    info!(
        voices = timelines.len(),
        size = layout.size,
        cell_width,
        cell_height,
        "grid laid out"
    );
    let (graph, root) = build_grid_graph(&timelines, &padding, &layout, &config.canvas_color)?;

    let work = WorkDir::create(config)?;
    let mut evaluator = Evaluator::new(&graph, tool, work.path(), &config.intermediate_extension);
    evaluator.evaluate(root, output)?;
    let invocations = evaluator.invocations();

    Ok(RenderSummary {
        output: output.to_path_buf(),
        voices: timelines.len(),
        grid: layout,
        duration,
        shifts: prepared.shifts,
        warnings: prepared.warnings,
        substituted,
        invocations,
        work_dir: work.finish(),
    })
}

/// Directory for intermediates: either the configured one (kept) or a
/// temporary one (removed on drop unless kept).
enum WorkDir {
    Fixed(PathBuf),
    Temporary { dir: tempfile::TempDir, keep: bool },
}

impl WorkDir {
    fn create(config: &RenderConfig) -> Result<Self, RenderError> {
        match &config.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(WorkDir::Fixed(std::path::absolute(dir)?))
            }
            None => Ok(WorkDir::Temporary {
                dir: tempfile::Builder::new().prefix("grid-video-").tempdir()?,
                keep: config.keep_intermediates,
            }),
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Fixed(dir) => dir.as_path(),
            WorkDir::Temporary { dir, .. } => dir.path(),
        }
    }

    /// The directory left on disk, if any.
    fn finish(self) -> Option<PathBuf> {
        match self {
            WorkDir::Fixed(dir) => Some(dir),
            WorkDir::Temporary { dir, keep: true } => Some(dir.keep()),
            WorkDir::Temporary { keep: false, .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soundbank::ClipHandle;
    use grid_video_score::{Note, Track};

    fn bank(codes: &[i32]) -> Soundbank {
        Soundbank::from_clips(codes.iter().map(|&c| {
            (
                c,
                ClipHandle {
                    path: PathBuf::from(format!("/bank/{c}.mp4")),
                    duration: 1.0,
                },
            )
        }))
        .unwrap()
    }

    #[test]
    fn coverage_lists_missing_notes_only() {
        let voices = TrackAggregate::from_tracks([
            Track::from_notes([Note::new(60, 0.5), Note::silence(0.5), Note::new(62, 0.5)]),
            Track::from_notes([Note::new(64, 1.0), Note::new(60, 0.5)]),
        ]);
        let missing = coverage(&voices, &bank(&[-1, 60, 64]));
        assert_eq!(missing, BTreeSet::from([62]));
    }

    #[test]
    fn full_bank_has_full_coverage() {
        let voices = TrackAggregate::from_tracks([Track::from_notes([Note::new(60, 0.5)])]);
        assert!(coverage(&voices, &bank(&[-1, 60])).is_empty());
    }

    #[test]
    fn configured_work_dir_is_kept() {
        let parent = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            work_dir: Some(parent.path().join("work")),
            ..RenderConfig::default()
        };
        let work = WorkDir::create(&config).unwrap();
        assert!(work.path().is_dir());
        let kept = work.finish().unwrap();
        assert!(kept.is_dir());
    }

    #[test]
    fn temporary_work_dir_is_removed() {
        let work = WorkDir::create(&RenderConfig::default()).unwrap();
        let path = work.path().to_path_buf();
        assert!(path.is_dir());
        assert_eq!(work.finish(), None);
        assert!(!path.exists());
    }
}
