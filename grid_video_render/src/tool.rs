// External media tools.
//
// Everything that touches actual audio/video goes through two small traits:
//
// - `MediaProbe` answers questions about existing files (duration, frame
//   size). Used when loading the soundbank and sizing grid cells.
// - `RenderTool` runs one `RenderJob`: an operation with parameters, an
//   ordered list of input files, and an output path. A job either produces
//   its output file or fails with the tool's diagnostic.
//
// `Ffmpeg` implements both by shelling out to `ffmpeg` / `ffprobe` and
// blocking until they exit. Tests substitute a recording fake.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::RenderConfig;
use crate::error::RenderError;

pub trait MediaProbe {
    /// Length of a media file in seconds.
    fn duration(&self, path: &Path) -> Result<f64, RenderError>;
    /// Width and height of the first video stream.
    fn resolution(&self, path: &Path) -> Result<(u32, u32), RenderError>;
}

pub trait RenderTool {
    /// Run `job`, returning the path of the produced artifact.
    fn run(&mut self, job: &RenderJob) -> Result<PathBuf, RenderError>;
}

/// One render operation and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOp {
    /// Cut `[start, end)` seconds out of the single input.
    Trim { start: f64, end: f64 },
    /// Play the inputs back to back.
    Concat,
    /// Resize the single input's video.
    Scale { width: u32, height: u32 },
    /// Place each input's video at its `(x, y)` on a blank canvas. Stops
    /// with the shortest input.
    Overlay {
        canvas: (u32, u32),
        color: String,
        positions: Vec<(u32, u32)>,
    },
    /// Keep only the single input's audio.
    ExtractAudio,
    /// Mix all audio inputs into one stereo track.
    Mix,
    /// Video of input 0 with audio of input 1, cut to the shorter of the two.
    Mux,
}

impl JobOp {
    pub fn name(&self) -> &'static str {
        match self {
            JobOp::Trim { .. } => "trim",
            JobOp::Concat => "concat",
            JobOp::Scale { .. } => "scale",
            JobOp::Overlay { .. } => "overlay",
            JobOp::ExtractAudio => "extract-audio",
            JobOp::Mix => "mix",
            JobOp::Mux => "mux",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub op: JobOp,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

/// `ffmpeg` / `ffprobe` command-line driver.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    video_codec: String,
    output_audio_codec: String,
}

impl Ffmpeg {
    pub fn new(config: &RenderConfig) -> Self {
        Ffmpeg {
            ffmpeg: config.ffmpeg_binary.clone(),
            ffprobe: config.ffprobe_binary.clone(),
            video_codec: config.video_codec.clone(),
            output_audio_codec: config.output_audio_codec.clone(),
        }
    }

    /// Command-line arguments for `job`, excluding the binary itself.
    ///
    /// `Concat` also needs a list file; its path is passed in `list`.
    pub fn arguments(
        &self,
        job: &RenderJob,
        list: Option<&Path>,
    ) -> Result<Vec<String>, RenderError> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(String::from)
            .collect();
        let first = || {
            job.inputs
                .first()
                .ok_or(RenderError::EmptyNode(job.op.name()))
        };

        match &job.op {
            JobOp::Trim { start, end } => {
                Ffmpeg::push_input(&mut args, first()?);
                args.extend([
                    "-ss".into(),
                    format!("{start:.6}"),
                    "-to".into(),
                    format!("{end:.6}"),
                ]);
                self.push_intermediate_codecs(&mut args);
            }
            JobOp::Concat => {
                let list = list.ok_or(RenderError::EmptyNode("concat"))?;
                args.extend(["-f", "concat", "-safe", "0"].map(String::from));
                Ffmpeg::push_input(&mut args, list);
                args.extend(["-c".into(), "copy".into()]);
            }
            JobOp::Scale { width, height } => {
                Ffmpeg::push_input(&mut args, first()?);
                args.extend([
                    "-vf".into(),
                    format!("scale=w={width}:h={height},setsar=1"),
                ]);
                self.push_intermediate_codecs(&mut args);
            }
            JobOp::Overlay {
                canvas,
                color,
                positions,
            } => {
                for path in &job.inputs {
                    Ffmpeg::push_input(&mut args, path);
                }
                args.extend([
                    "-filter_complex".into(),
                    overlay_filter(*canvas, color, positions),
                    "-map".into(),
                    "[grid]".into(),
                    "-an".into(),
                    "-c:v".into(),
                    self.video_codec.clone(),
                    "-q:v".into(),
                    "2".into(),
                ]);
            }
            JobOp::ExtractAudio => {
                Ffmpeg::push_input(&mut args, first()?);
                args.extend(["-vn", "-acodec", "pcm_s16le"].map(String::from));
            }
            JobOp::Mix => {
                for path in &job.inputs {
                    Ffmpeg::push_input(&mut args, path);
                }
                args.extend([
                    "-filter_complex".into(),
                    format!("amix=inputs={}", job.inputs.len()),
                    "-vn".into(),
                    "-ac".into(),
                    "2".into(),
                    "-acodec".into(),
                    "pcm_s16le".into(),
                ]);
            }
            JobOp::Mux => {
                for path in &job.inputs {
                    Ffmpeg::push_input(&mut args, path);
                }
                args.extend([
                    "-map".into(),
                    "0:v:0".into(),
                    "-map".into(),
                    "1:a:0".into(),
                    "-c:v".into(),
                    "copy".into(),
                    "-c:a".into(),
                    self.output_audio_codec.clone(),
                    "-shortest".into(),
                ]);
            }
        }
        args.push(job.output.display().to_string());
        Ok(args)
    }

    fn push_input(args: &mut Vec<String>, path: &Path) {
        args.push("-i".into());
        args.push(path.display().to_string());
    }

    fn push_intermediate_codecs(&self, args: &mut Vec<String>) {
        args.extend([
            "-c:v".into(),
            self.video_codec.clone(),
            "-q:v".into(),
            "2".into(),
            "-c:a".into(),
            "pcm_s16le".into(),
        ]);
    }

    fn execute(binary: &Path, args: &[String]) -> Result<Output, RenderError> {
        let tool = binary.display().to_string();
        debug!(%tool, ?args, "running external tool");
        let output = Command::new(binary)
            .args(args)
            .output()
            .map_err(|source| RenderError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RenderError::ExternalTool {
                tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn probe(&self, path: &Path) -> Result<ProbeOutput, RenderError> {
        let args: Vec<String> = [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .into_iter()
        .map(String::from)
        .chain([path.display().to_string()])
        .collect();
        let output = Ffmpeg::execute(&self.ffprobe, &args)?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl RenderTool for Ffmpeg {
    #[instrument(skip(self, job), fields(op = job.op.name(), output = %job.output.display()))]
    fn run(&mut self, job: &RenderJob) -> Result<PathBuf, RenderError> {
        let list = match job.op {
            JobOp::Concat => {
                if job.inputs.is_empty() {
                    return Err(RenderError::EmptyNode("concat"));
                }
                let list = job.output.with_extension("concat.txt");
                std::fs::write(&list, concat_list(&job.inputs))?;
                Some(list)
            }
            _ => None,
        };
        let args = self.arguments(job, list.as_deref())?;
        Ffmpeg::execute(&self.ffmpeg, &args)?;
        Ok(job.output.clone())
    }
}

impl MediaProbe for Ffmpeg {
    fn duration(&self, path: &Path) -> Result<f64, RenderError> {
        let probed = self.probe(path)?;
        probed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.trim().parse::<f64>().ok())
            .ok_or_else(|| RenderError::Probe {
                path: path.to_path_buf(),
                reason: "no duration reported".into(),
            })
    }

    fn resolution(&self, path: &Path) -> Result<(u32, u32), RenderError> {
        let probed = self.probe(path)?;
        probed
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("video"))
            .find_map(|s| s.width.zip(s.height))
            .ok_or_else(|| RenderError::Probe {
                path: path.to_path_buf(),
                reason: "no video stream".into(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Input list for ffmpeg's concat demuxer.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::new();
    for path in inputs {
        let quoted = path.display().to_string().replace('\'', r"'\''");
        let _ = writeln!(list, "file '{quoted}'");
    }
    list
}

/// `-filter_complex` graph placing each input on a blank canvas.
pub fn overlay_filter(canvas: (u32, u32), color: &str, positions: &[(u32, u32)]) -> String {
    let mut filter = format!("color=size={}x{}:color={color} [base];", canvas.0, canvas.1);
    for i in 0..positions.len() {
        let _ = write!(filter, " [{i}:v] setpts=PTS-STARTPTS [cell{i}];");
    }
    let mut previous = "[base]".to_string();
    for (i, (x, y)) in positions.iter().enumerate() {
        let label = if i + 1 == positions.len() {
            "[grid]".to_string()
        } else {
            format!("[stage{i}]")
        };
        let _ = write!(filter, " {previous}[cell{i}] overlay=shortest=1:x={x}:y={y} {label};");
        previous = label;
    }
    filter.trim_end_matches(';').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg() -> Ffmpeg {
        Ffmpeg::new(&RenderConfig::default())
    }

    fn job(op: JobOp, inputs: &[&str], output: &str) -> RenderJob {
        RenderJob {
            op,
            inputs: inputs.iter().map(PathBuf::from).collect(),
            output: PathBuf::from(output),
        }
    }

    #[test]
    fn trim_arguments() {
        let args = ffmpeg()
            .arguments(&job(JobOp::Trim { start: 0.0, end: 0.5 }, &["c4.mp4"], "t.avi"), None)
            .unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-i c4.mp4 -ss 0.000000 -to 0.500000"));
        assert_eq!(args.last().unwrap(), "t.avi");
    }

    #[test]
    fn concat_reads_the_list_file() {
        let args = ffmpeg()
            .arguments(
                &job(JobOp::Concat, &["a.avi", "b.avi"], "v.avi"),
                Some(Path::new("v.concat.txt")),
            )
            .unwrap();
        assert_eq!(
            args.join(" "),
            "-y -hide_banner -loglevel error -f concat -safe 0 -i v.concat.txt -c copy v.avi"
        );
    }

    #[test]
    fn concat_without_list_fails() {
        let result = ffmpeg().arguments(&job(JobOp::Concat, &["a.avi"], "v.avi"), None);
        assert!(matches!(result, Err(RenderError::EmptyNode("concat"))));
    }

    #[test]
    fn scale_arguments() {
        let args = ffmpeg()
            .arguments(&job(JobOp::Scale { width: 320, height: 240 }, &["v.avi"], "s.avi"), None)
            .unwrap();
        assert_eq!(
            args.join(" "),
            "-y -hide_banner -loglevel error -i v.avi -vf scale=w=320:h=240,setsar=1 \
             -c:v mpeg4 -q:v 2 -c:a pcm_s16le s.avi"
        );
    }

    #[test]
    fn extract_audio_drops_video() {
        let args = ffmpeg()
            .arguments(&job(JobOp::ExtractAudio, &["v.avi"], "a.wav"), None)
            .unwrap();
        assert_eq!(
            args.join(" "),
            "-y -hide_banner -loglevel error -i v.avi -vn -acodec pcm_s16le a.wav"
        );
    }

    #[test]
    fn run_writes_concat_list_before_invoking() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            ffmpeg_binary: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..RenderConfig::default()
        };
        let inputs = vec![dir.path().join("a.avi"), dir.path().join("b.avi")];
        let concat = RenderJob {
            op: JobOp::Concat,
            inputs: inputs.clone(),
            output: dir.path().join("voice.avi"),
        };

        let result = Ffmpeg::new(&config).run(&concat);

        assert!(matches!(result, Err(RenderError::Spawn { .. })));
        let list = std::fs::read_to_string(dir.path().join("voice.concat.txt")).unwrap();
        assert_eq!(list, concat_list(&inputs));
    }

    #[test]
    fn run_rejects_empty_concat() {
        let dir = tempfile::tempdir().unwrap();
        let concat = RenderJob {
            op: JobOp::Concat,
            inputs: Vec::new(),
            output: dir.path().join("voice.avi"),
        };
        let result = ffmpeg().run(&concat);
        assert!(matches!(result, Err(RenderError::EmptyNode("concat"))));
        assert!(!dir.path().join("voice.concat.txt").exists());
    }

    #[test]
    fn mux_cuts_to_shortest() {
        let args = ffmpeg()
            .arguments(&job(JobOp::Mux, &["v.avi", "a.wav"], "out.mp4"), None)
            .unwrap();
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.join(" ").contains("-i v.avi -i a.wav -map 0:v:0 -map 1:a:0"));
    }

    #[test]
    fn mix_counts_inputs() {
        let args = ffmpeg()
            .arguments(&job(JobOp::Mix, &["a.wav", "b.wav", "c.wav"], "m.wav"), None)
            .unwrap();
        assert!(args.contains(&"amix=inputs=3".to_string()));
    }

    #[test]
    fn trim_without_input_fails() {
        let result =
            ffmpeg().arguments(&job(JobOp::Trim { start: 0.0, end: 1.0 }, &[], "t.avi"), None);
        assert!(matches!(result, Err(RenderError::EmptyNode("trim"))));
    }

    #[test]
    fn concat_list_quotes_paths() {
        let list = concat_list(&[PathBuf::from("/tmp/a.avi"), PathBuf::from("/tmp/it's.avi")]);
        assert_eq!(list, "file '/tmp/a.avi'\nfile '/tmp/it'\\''s.avi'\n");
    }

    #[test]
    fn overlay_filter_chains_cells() {
        let filter = overlay_filter((200, 100), "black", &[(0, 0), (100, 0)]);
        assert_eq!(
            filter,
            "color=size=200x100:color=black [base]; \
             [0:v] setpts=PTS-STARTPTS [cell0]; \
             [1:v] setpts=PTS-STARTPTS [cell1]; \
             [base][cell0] overlay=shortest=1:x=0:y=0 [stage0]; \
             [stage0][cell1] overlay=shortest=1:x=100:y=0 [grid]"
        );
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let result = Ffmpeg::execute(Path::new("/nonexistent/ffmpeg-binary"), &[]);
        assert!(matches!(result, Err(RenderError::Spawn { .. })));
    }

    #[test]
    fn probe_output_parses() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1920, "height": 1080}
            ],
            "format": {"duration": "2.500000"}
        }"#;
        let probed: ProbeOutput = serde_json::from_str(json).unwrap();
        assert_eq!(probed.format.unwrap().duration.as_deref(), Some("2.500000"));
        assert_eq!(probed.streams[1].width, Some(1920));
    }
}
