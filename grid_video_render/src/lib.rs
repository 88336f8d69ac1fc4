// Grid Video renderer
//
// Takes the monophonic voices produced by `grid_video_score` and performs
// them with a soundbank of single-note video clips, one grid cell per voice.
// Nothing here decodes or encodes media: every audio/video operation is a
// job handed to an external tool (ffmpeg) through the `RenderTool` trait.
//
// Architecture:
// - soundbank.rs: note code -> clip lookup, loaded from a directory
// - tool.rs: `MediaProbe` / `RenderTool` traits and the ffmpeg driver
// - timeline.rs: voice -> ordered clip segments
// - graph.rs: render DAG with interned nodes and topological ordering
// - evaluate.rs: memoized, sequential evaluation of the DAG
// - layout.rs: square grid placement and graph construction
// - config.rs: `RenderConfig`, loaded from JSON
// - pipeline.rs: MIDI + soundbank -> video, and the coverage check
// - error.rs: `RenderError`
//
// The `grid-video` binary (main.rs) is a thin command-line wrapper around
// `pipeline`.

pub mod config;
pub mod error;
pub mod evaluate;
pub mod graph;
pub mod layout;
pub mod pipeline;
pub mod soundbank;
pub mod timeline;
pub mod tool;

pub use config::RenderConfig;
pub use error::RenderError;
pub use pipeline::{CoverageReport, RenderSummary, check_coverage, make_grid_video};
pub use soundbank::{ClipHandle, Soundbank};
pub use tool::{Ffmpeg, MediaProbe, RenderJob, RenderTool};
