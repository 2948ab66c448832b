// ============================================================================
// StrataPaint CLI: headless editing sessions driven by a Rhai script
// ============================================================================
//
// Usage examples:
//   stratapaint --script sketch.rhai --output sketch.png
//   stratapaint -i photo.jpg -s grade.rhai -o graded.png
//   stratapaint -W 1920 -H 1080 --background "#00000000" -s logo.rhai -o logo.png
//
// The session is created from the saved editor settings (or --config), the
// optional input image becomes an image layer above the background, the
// script runs to completion, and the flattened canvas is written as PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;

use crate::canvas::parse_hex_color;
use crate::ops::scripting::{self, SharedProject};
use crate::project::Project;
use crate::settings::EditorSettings;
use crate::{log_err, log_info, logger};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// StrataPaint headless layer editor.
#[derive(Parser, Debug)]
#[command(
    name = "stratapaint",
    about = "StrataPaint headless layer editor",
    long_about = "Build a layered canvas with a Rhai script and export the flattened\n\
                  result as PNG, without opening an editor window.\n\n\
                  Example:\n  \
                  stratapaint --script sketch.rhai --output sketch.png\n  \
                  stratapaint -i photo.jpg -s grade.rhai -o graded.png"
)]
pub struct CliArgs {
    /// Rhai script to run against the session.
    /// If omitted, the canvas (plus any --input image) is exported as-is.
    #[arg(short, long, value_name = "SCRIPT.rhai")]
    pub script: Option<PathBuf>,

    /// PNG file to write the flattened canvas to.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Image imported as a layer above the background before the script runs.
    #[arg(short, long, value_name = "IMAGE")]
    pub input: Option<PathBuf>,

    /// Canvas width in pixels (default: from settings, or the input image).
    #[arg(short = 'W', long, value_name = "PX")]
    pub width: Option<u32>,

    /// Canvas height in pixels (default: from settings, or the input image).
    #[arg(short = 'H', long, value_name = "PX")]
    pub height: Option<u32>,

    /// Compositing background, e.g. "#ffffff" or "#00000000" for transparency.
    #[arg(long, value_name = "HEX")]
    pub background: Option<String>,

    /// Settings file to use instead of the per-user one.
    #[arg(short, long, value_name = "FILE.cfg")]
    pub config: Option<PathBuf>,

    /// Echo the session log and script output to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub layer_count: usize,
    pub history_len: usize,
    pub console_output: Vec<String>,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run one headless session and return an OS exit code.
/// `0` = output written, `1` = anything failed (nothing is written then).
pub fn run(args: CliArgs) -> ExitCode {
    logger::set_echo_stderr(args.verbose);
    let start = Instant::now();

    match run_session(&args) {
        Ok(summary) => {
            if args.verbose {
                for line in &summary.console_output {
                    println!("  [script] {}", line);
                }
                println!(
                    "  → {} ({}x{}, {} layers, {:.0}ms)",
                    summary.output.display(),
                    summary.width,
                    summary.height,
                    summary.layer_count,
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log_err!("CLI run failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// The CLI pipeline without process concerns: settings, input, script, export.
pub fn run_session(args: &CliArgs) -> Result<RunSummary, String> {
    // -- Step 1: Settings -------------------------------------------------
    let mut settings = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(format!("config file '{}' does not exist", path.display()));
            }
            EditorSettings::load_from(path)
        }
        None => EditorSettings::load(),
    };

    let input_pixels = match &args.input {
        Some(path) => Some(
            crate::io::load_image(path).map_err(|e| format!("could not load input: {}", e))?,
        ),
        None => None,
    };

    // An input image sizes the canvas unless the size is given explicitly.
    if let Some(img) = &input_pixels {
        settings.canvas_width = img.width();
        settings.canvas_height = img.height();
    }
    if let Some(w) = args.width {
        settings.canvas_width = w;
    }
    if let Some(h) = args.height {
        settings.canvas_height = h;
    }
    if settings.canvas_width == 0 || settings.canvas_height == 0 {
        return Err("canvas width and height must be at least 1".to_string());
    }
    if let Some(hex) = &args.background {
        settings.background =
            parse_hex_color(hex).ok_or_else(|| format!("invalid background colour '{}'", hex))?;
    }

    let script_source = match &args.script {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
            format!("could not read script '{}': {}", path.display(), e)
        })?),
        None => None,
    };

    // -- Step 2: Session --------------------------------------------------
    let mut project = Project::with_settings(&settings);
    project.name = session_name(args);

    if let (Some(pixels), Some(path)) = (input_pixels, &args.input) {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Image".to_string());
        project.import_decoded(pixels, &name);
    }

    let shared: SharedProject = Arc::new(Mutex::new(project));

    // -- Step 3: Script ---------------------------------------------------
    let console_output = match &script_source {
        Some(src) => {
            let report = scripting::execute_script(&shared, src)
                .map_err(|e| format!("script error:\n{}", e.friendly_message()))?;
            report.console_output
        }
        None => Vec::new(),
    };

    // -- Step 4: Export ---------------------------------------------------
    let mut project = shared.lock().unwrap_or_else(|e| e.into_inner());
    project.wait_for_jobs();
    project
        .export_png_to(&args.output)
        .map_err(|e| format!("export failed: {}", e))?;
    log_info!("Wrote {}", args.output.display());

    Ok(RunSummary {
        output: args.output.clone(),
        width: project.stack().width(),
        height: project.stack().height(),
        layer_count: project.stack().len(),
        history_len: project.history().len(),
        console_output,
    })
}

fn session_name(args: &CliArgs) -> String {
    let stem = |p: &Path| p.file_stem().map(|s| s.to_string_lossy().to_string());
    args.script
        .as_deref()
        .and_then(stem)
        .or_else(|| args.input.as_deref().and_then(stem))
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_arguments_parse() {
        let args = CliArgs::parse_from(["stratapaint", "-o", "out.png"]);
        assert_eq!(args.output, PathBuf::from("out.png"));
        assert!(args.script.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn size_flags_use_capital_short_names() {
        let args = CliArgs::parse_from([
            "stratapaint", "-W", "640", "-H", "480", "-s", "a.rhai", "-o", "b.png",
        ]);
        assert_eq!((args.width, args.height), (Some(640), Some(480)));
        assert_eq!(session_name(&args), "a");
    }

    #[test]
    fn output_is_required() {
        assert!(CliArgs::try_parse_from(["stratapaint", "-s", "a.rhai"]).is_err());
    }

    #[test]
    fn bad_background_is_rejected_before_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = dir.path().join("s.cfg");
        EditorSettings::default().save_to(&cfg).expect("save");
        let out = dir.path().join("out.png");
        let args = CliArgs::parse_from([
            "stratapaint",
            "-c",
            cfg.to_str().expect("utf8"),
            "--background",
            "white",
            "-o",
            out.to_str().expect("utf8"),
        ]);
        assert!(run_session(&args).is_err());
        assert!(!out.exists());
    }
}
