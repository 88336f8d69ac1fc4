// Render configuration.
//
// Every knob of the pipeline in one serde struct, loaded from JSON. Missing
// fields take their defaults, so `{}` is a valid config. The binary applies
// command-line overrides on top of whatever was loaded.

use std::path::{Path, PathBuf};

use grid_video_score::ShiftMode;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub ffmpeg_binary: PathBuf,
    pub ffprobe_binary: PathBuf,
    /// Grid cell size in pixels. When unset, cells are sized so the whole
    /// grid matches the silence clip's resolution.
    pub cell_width: Option<u32>,
    pub cell_height: Option<u32>,
    /// Transpose voices by octaves to fit the soundbank.
    pub autoshift: bool,
    pub shift_mode: ShiftMode,
    /// Upper bound on octaves moved per voice; unset means no bound.
    pub max_octave_correction: Option<u32>,
    /// Codec for intermediate and final video.
    pub video_codec: String,
    /// Codec for the final output's audio.
    pub output_audio_codec: String,
    /// Container extension for intermediate video files.
    pub intermediate_extension: String,
    pub canvas_color: String,
    /// Where intermediates go. A fresh temporary directory when unset.
    pub work_dir: Option<PathBuf>,
    pub keep_intermediates: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            ffprobe_binary: PathBuf::from("ffprobe"),
            cell_width: None,
            cell_height: None,
            autoshift: true,
            shift_mode: ShiftMode::Octave,
            max_octave_correction: None,
            video_codec: "mpeg4".into(),
            output_audio_codec: "aac".into(),
            intermediate_extension: "avi".into(),
            canvas_color: "black".into(),
            work_dir: None,
            keep_intermediates: false,
        }
    }
}

impl RenderConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(json: &str) -> Result<Self, RenderError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Cell size from the config, if both dimensions are set.
    pub fn cell_size(&self) -> Option<(u32, u32)> {
        self.cell_width.zip(self.cell_height)
    }
}
