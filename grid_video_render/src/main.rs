// CLI entry point for the grid video renderer.
//
// Reads a MIDI file, performs every voice with clips from a soundbank
// directory and writes the tiled result. See `pipeline.rs` for the stages.
//
// Usage:
//   grid-video --input <MIDI> --soundbank <DIR> --output <FILE> [OPTIONS]
//     --config, -c <JSON>       Render config (defaults for missing fields)
//     --no-autoshift            Do not transpose voices into soundbank range
//     --max-correction <N>      Move voices by at most N octaves
//     --cell <W>x<H>            Grid cell size in pixels
//     --work-dir <DIR>          Keep intermediates in DIR
//     --keep-intermediates      Keep the temporary work directory
//     --coverage-test, -t       Only report notes missing from the soundbank
//     --dump-voices <JSON>      Write the prepared voices as JSON and stop
//
// Log verbosity follows RUST_LOG (default: info).

use std::path::PathBuf;

use anyhow::{Context, bail};
use grid_video_render::pipeline::{check_coverage, make_grid_video, prepare_score};
use grid_video_render::{Ffmpeg, RenderConfig, Soundbank};
use grid_video_score::note_name;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct CliArgs {
    input: Option<PathBuf>,
    soundbank: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    no_autoshift: bool,
    max_correction: Option<u32>,
    cell: Option<(u32, u32)>,
    work_dir: Option<PathBuf>,
    keep_intermediates: bool,
    coverage_test: bool,
    dump_voices: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = parse_args();
    let mut config = match &args.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RenderConfig::default(),
    };
    apply_overrides(&mut config, &args);

    let Some(midi) = args.input.as_deref() else {
        bail!("--input is required (see --help)");
    };
    let Some(soundbank) = args.soundbank.as_deref() else {
        bail!("--soundbank is required (see --help)");
    };
    let mut ffmpeg = Ffmpeg::new(&config);

    if args.coverage_test {
        let report = check_coverage(midi, soundbank, &config, &ffmpeg)
            .with_context(|| format!("coverage check of {} failed", midi.display()))?;
        println!("Voices: {}", report.voices);
        if report.missing.is_empty() {
            println!("Soundbank covers every note.");
        } else {
            let names: Vec<String> = report.missing.iter().map(|&c| note_name(c)).collect();
            println!("Missing notes ({}): {}", names.len(), names.join(" "));
        }
        return Ok(());
    }

    if let Some(path) = &args.dump_voices {
        let bank = Soundbank::load(soundbank, &ffmpeg)
            .with_context(|| format!("failed to load soundbank {}", soundbank.display()))?;
        let prepared = prepare_score(midi, &bank, &config)?;
        let json = serde_json::to_string_pretty(&prepared.voices)?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {} voices to {}", prepared.voices.len(), path.display());
        return Ok(());
    }

    let Some(output) = args.output.as_deref() else {
        bail!("--output is required (see --help)");
    };
    println!("=== Grid Video ===");
    println!("MIDI: {}", midi.display());
    println!("Soundbank: {}", soundbank.display());
    println!("Output: {}", output.display());
    println!();

    let summary = make_grid_video(midi, soundbank, output, &config, &mut ffmpeg)
        .with_context(|| format!("rendering {} failed", midi.display()))?;

    println!(
        "Rendered {} voices on a {}x{} grid ({:.2}s, {} render jobs)",
        summary.voices, summary.grid.size, summary.grid.size, summary.duration, summary.invocations
    );
    if !summary.substituted.is_empty() {
        let names: Vec<String> = summary.substituted.iter().map(|&c| note_name(c)).collect();
        println!("Played as silence (missing from soundbank): {}", names.join(" "));
    }
    if !summary.warnings.is_empty() {
        println!("{} malformed MIDI events were skipped", summary.warnings.len());
    }
    if let Some(dir) = &summary.work_dir {
        println!("Intermediates kept in {}", dir.display());
    }
    Ok(())
}

fn apply_overrides(config: &mut RenderConfig, args: &CliArgs) {
    if args.no_autoshift {
        config.autoshift = false;
    }
    if args.max_correction.is_some() {
        config.max_octave_correction = args.max_correction;
    }
    if let Some((width, height)) = args.cell {
        config.cell_width = Some(width);
        config.cell_height = Some(height);
    }
    if args.work_dir.is_some() {
        config.work_dir = args.work_dir.clone();
    }
    if args.keep_intermediates {
        config.keep_intermediates = true;
    }
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> CliArgs {
    let mut cli = CliArgs::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    let value = |i: usize, flag: &str| -> String {
        args.get(i).cloned().unwrap_or_else(|| {
            eprintln!("{flag} requires a value");
            std::process::exit(1);
        })
    };

    while i < args.len() {
        match args[i].as_str() {
            "--input" | "-i" => {
                i += 1;
                cli.input = Some(PathBuf::from(value(i, "--input")));
            }
            "--soundbank" | "-s" => {
                i += 1;
                cli.soundbank = Some(PathBuf::from(value(i, "--soundbank")));
            }
            "--output" | "-o" => {
                i += 1;
                cli.output = Some(PathBuf::from(value(i, "--output")));
            }
            "--config" | "-c" => {
                i += 1;
                cli.config = Some(PathBuf::from(value(i, "--config")));
            }
            "--no-autoshift" => cli.no_autoshift = true,
            "--max-correction" => {
                i += 1;
                cli.max_correction = Some(value(i, "--max-correction").parse().unwrap_or_else(|_| {
                    eprintln!("--max-correction requires a non-negative number");
                    std::process::exit(1);
                }));
            }
            "--cell" => {
                i += 1;
                cli.cell = Some(parse_cell(&value(i, "--cell")).unwrap_or_else(|| {
                    eprintln!("--cell requires <WIDTH>x<HEIGHT>, e.g. 320x240");
                    std::process::exit(1);
                }));
            }
            "--work-dir" => {
                i += 1;
                cli.work_dir = Some(PathBuf::from(value(i, "--work-dir")));
            }
            "--keep-intermediates" => cli.keep_intermediates = true,
            "--coverage-test" | "-t" => cli.coverage_test = true,
            "--dump-voices" => {
                i += 1;
                cli.dump_voices = Some(PathBuf::from(value(i, "--dump-voices")));
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn parse_cell(s: &str) -> Option<(u32, u32)> {
    let (width, height) = s.split_once(['x', 'X'])?;
    let size = (width.parse().ok()?, height.parse().ok()?);
    (size.0 > 0 && size.1 > 0).then_some(size)
}

fn print_usage() {
    println!("Usage: grid-video --input <MIDI> --soundbank <DIR> --output <FILE> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --input, -i <MIDI>        MIDI file to render");
    println!("  --soundbank, -s <DIR>     Directory of note clips plus a silence clip");
    println!("  --output, -o <FILE>       Output video");
    println!("  --config, -c <JSON>       Render config");
    println!("  --no-autoshift            Do not transpose voices into soundbank range");
    println!("  --max-correction <N>      Move voices by at most N octaves");
    println!("  --cell <W>x<H>            Grid cell size in pixels");
    println!("  --work-dir <DIR>          Keep intermediates in DIR");
    println!("  --keep-intermediates      Keep the temporary work directory");
    println!("  --coverage-test, -t       Only report notes missing from the soundbank");
    println!("  --dump-voices <JSON>      Write the prepared voices as JSON and stop");
    println!("  --help, -h                Show this help");
}
