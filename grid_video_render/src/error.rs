// Errors raised while assembling and rendering a grid video.
//
// Failures of the external tools (ffmpeg, ffprobe) are fatal: the pipeline
// stops at the first one and surfaces the tool's stderr. `NoteNotFound` is
// the only variant callers routinely recover from (the timeline compiler
// substitutes the silence clip).

use std::path::PathBuf;

use grid_video_score::ScoreError;

use crate::graph::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("soundbank has no note {0}")]
    NoteNotFound(i32),

    #[error("soundbank in {0} has no silence clip")]
    MissingSilenceClip(PathBuf),

    #[error("silence clip must have a positive duration, got {duration}s")]
    InvalidSilenceClip { duration: f64 },

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({status}): {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("could not probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("render node {node} depends on unknown node {dependency}")]
    DanglingNode { node: NodeId, dependency: NodeId },

    #[error("render node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("{0} node needs at least one input")]
    EmptyNode(&'static str),

    #[error("score has no voices to render")]
    NothingToRender,
}
