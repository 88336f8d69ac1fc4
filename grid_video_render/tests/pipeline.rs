// End-to-end pipeline runs against a fake media tool.
//
// The fake answers probes from the clip's file name (silence clips are
// 0.25s, everything else 1s, all 640x480), records every job, and creates
// each job's output as an empty file. The soundbank is a temp directory of
// empty files; the MIDI file is written with `midly`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use grid_video_render::tool::JobOp;
use grid_video_render::{
    MediaProbe, RenderConfig, RenderError, RenderJob, RenderTool, check_coverage, make_grid_video,
};
use grid_video_score::ShiftOutcome;
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

#[derive(Default)]
struct FakeTool {
    jobs: Vec<RenderJob>,
    fail_on: Option<&'static str>,
}

impl MediaProbe for FakeTool {
    fn duration(&self, path: &Path) -> Result<f64, RenderError> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        Ok(if stem == "silence" { 0.25 } else { 1.0 })
    }

    fn resolution(&self, _path: &Path) -> Result<(u32, u32), RenderError> {
        Ok((640, 480))
    }
}

impl RenderTool for FakeTool {
    fn run(&mut self, job: &RenderJob) -> Result<PathBuf, RenderError> {
        if self.fail_on == Some(job.op.name()) {
            return Err(RenderError::ExternalTool {
                tool: "ffmpeg".into(),
                status: "exit status: 1".into(),
                stderr: "simulated failure".into(),
            });
        }
        for input in &job.inputs {
            assert!(input.exists(), "job input {} was never produced", input.display());
        }
        std::fs::write(&job.output, b"")?;
        self.jobs.push(job.clone());
        Ok(job.output.clone())
    }
}

fn event(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        },
    }
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// c4 and e4 together for a beat, then g4 alone for a beat, at 120 bpm.
fn write_midi(dir: &Path) -> PathBuf {
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(480))));
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))),
        },
        end_of_track(),
    ]);
    smf.tracks.push(vec![
        event(0, 60, 90),
        event(0, 64, 90),
        event(480, 60, 0),
        event(0, 64, 0),
        event(0, 67, 90),
        event(480, 67, 0),
        end_of_track(),
    ]);
    let mut buf = Vec::new();
    smf.write(&mut buf).unwrap();
    let path = dir.join("chords.mid");
    std::fs::write(&path, buf).unwrap();
    path
}

fn write_soundbank(dir: &Path, names: &[&str]) -> PathBuf {
    let bank = dir.join("bank");
    std::fs::create_dir(&bank).unwrap();
    for name in names {
        std::fs::write(bank.join(format!("{name}.mp4")), b"").unwrap();
    }
    std::fs::write(bank.join("README.txt"), b"not a clip").unwrap();
    bank
}

fn quiet_config() -> RenderConfig {
    RenderConfig {
        autoshift: false,
        ..RenderConfig::default()
    }
}

#[test]
fn renders_a_two_voice_grid() {
    let dir = tempfile::tempdir().unwrap();
    let midi = write_midi(dir.path());
    let bank = write_soundbank(dir.path(), &["c4", "e4", "a4", "silence"]);
    let output = dir.path().join("grid.mp4");
    let mut tool = FakeTool::default();

    let summary =
        make_grid_video(&midi, &bank, &output, &RenderConfig::default(), &mut tool).unwrap();

    assert!(output.exists());
    assert_eq!(summary.voices, 2);
    assert_eq!(summary.grid.size, 2);
    assert!((summary.duration - 1.0).abs() < 1e-6);
    assert_eq!(summary.shifts, [ShiftOutcome::Fits, ShiftOutcome::Fits]);
    // g4 is not in the bank.
    assert_eq!(summary.substituted, BTreeSet::from([67]));
    assert_eq!(summary.work_dir, None);

    // Cell size derived from the silence clip: 640x480 split over 2x2.
    assert_eq!((summary.grid.cell_width, summary.grid.cell_height), (320, 240));
    let overlay = tool
        .jobs
        .iter()
        .find(|j| j.op.name() == "overlay")
        .unwrap();
    let JobOp::Overlay { canvas, positions, .. } = &overlay.op else {
        unreachable!();
    };
    assert_eq!(*canvas, (640, 480));
    assert_eq!(positions, &vec![(0, 0), (320, 0), (0, 240), (320, 240)]);
    assert_eq!(overlay.inputs.len(), 4);

    // 3 distinct trims, 3 concats (two voices, one padding), 3 scales,
    // 2 audio extracts, overlay, mix, mux.
    assert_eq!(summary.invocations, 14);
    assert_eq!(tool.jobs.len(), 14);
    let last = tool.jobs.last().unwrap();
    assert_eq!(last.op, JobOp::Mux);
    assert_eq!(last.output, output);
}

#[test]
fn configured_cell_size_wins() {
    let dir = tempfile::tempdir().unwrap();
    let midi = write_midi(dir.path());
    let bank = write_soundbank(dir.path(), &["c4", "e4", "g4", "silence"]);
    let config = RenderConfig {
        cell_width: Some(100),
        cell_height: Some(80),
        ..quiet_config()
    };
    let mut tool = FakeTool::default();

    let summary =
        make_grid_video(&midi, &bank, &dir.path().join("out.mp4"), &config, &mut tool).unwrap();

    assert!(summary.substituted.is_empty());
    assert!(summary.shifts.is_empty());
    let scales: Vec<&JobOp> = tool
        .jobs
        .iter()
        .map(|j| &j.op)
        .filter(|op| matches!(op, JobOp::Scale { .. }))
        .collect();
    assert!(!scales.is_empty());
    assert!(
        scales
            .iter()
            .all(|op| **op == JobOp::Scale { width: 100, height: 80 })
    );
}

#[test]
fn voices_are_shifted_into_the_bank() {
    let dir = tempfile::tempdir().unwrap();
    let midi = write_midi(dir.path());
    let bank = write_soundbank(dir.path(), &["c5", "e5", "silence"]);
    let mut tool = FakeTool::default();

    let summary = make_grid_video(
        &midi,
        &bank,
        &dir.path().join("out.mp4"),
        &RenderConfig::default(),
        &mut tool,
    )
    .unwrap();

    // Second voice is a lone e4, 8 semitones under c5: one octave up.
    assert_eq!(summary.shifts[1], ShiftOutcome::Shifted { octaves: 1 });
    assert!(!summary.substituted.contains(&76));
}

#[test]
fn coverage_reports_missing_notes() {
    let dir = tempfile::tempdir().unwrap();
    let midi = write_midi(dir.path());
    let bank = write_soundbank(dir.path(), &["c4", "e4", "silence"]);

    let report = check_coverage(&midi, &bank, &quiet_config(), &FakeTool::default()).unwrap();

    assert_eq!(report.voices, 2);
    assert_eq!(report.missing, BTreeSet::from([67]));
}

#[test]
fn tool_failure_aborts_the_render() {
    let dir = tempfile::tempdir().unwrap();
    let midi = write_midi(dir.path());
    let bank = write_soundbank(dir.path(), &["c4", "e4", "g4", "silence"]);
    let output = dir.path().join("out.mp4");
    let mut tool = FakeTool {
        fail_on: Some("overlay"),
        ..FakeTool::default()
    };

    let result = make_grid_video(&midi, &bank, &output, &quiet_config(), &mut tool);

    assert!(matches!(result, Err(RenderError::ExternalTool { .. })));
    assert!(!output.exists());
    assert!(tool.jobs.iter().all(|j| j.op.name() != "mux"));
}

#[test]
fn soundbank_without_silence_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let midi = write_midi(dir.path());
    let bank = write_soundbank(dir.path(), &["c4", "e4", "g4"]);

    let result = make_grid_video(
        &midi,
        &bank,
        &dir.path().join("out.mp4"),
        &quiet_config(),
        &mut FakeTool::default(),
    );

    assert!(matches!(result, Err(RenderError::MissingSilenceClip(_))));
}

#[test]
fn kept_intermediates_stay_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let midi = write_midi(dir.path());
    let bank = write_soundbank(dir.path(), &["c4", "e4", "g4", "silence"]);
    let config = RenderConfig {
        work_dir: Some(dir.path().join("work")),
        ..quiet_config()
    };
    let mut tool = FakeTool::default();

    let summary =
        make_grid_video(&midi, &bank, &dir.path().join("out.mp4"), &config, &mut tool).unwrap();

    let work = summary.work_dir.unwrap();
    let intermediates = std::fs::read_dir(&work).unwrap().count();
    assert_eq!(intermediates, summary.invocations - 1);
}
