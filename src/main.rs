//! MARCI ISIS Pipeline CLI
//!
//! Runs raw MARCI images through marci2isis, spiceinit, marcical, explode,
//! cam2map and isis2std.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use marci_isis::exec::ProcessRunner;
use marci_isis::logging::{self, DEFAULT_LOG_FILE};
use marci_isis::pipeline::{inventory, ProductKind};
use marci_isis::projection::{MapSource, ProjectionPreset};
use marci_isis::{build_runtime, prepare_run, run_pipeline, Config, RunRequest, Stage};

#[derive(Parser)]
#[command(name = "marci-isis", version)]
#[command(about = "Process MARCI images using ISIS", long_about = None)]
struct Cli {
    /// Path to an optional configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log file, appended to alongside console output
    #[arg(long, default_value = DEFAULT_LOG_FILE, global = true)]
    log_file: PathBuf,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Path to custom ISIS .map template
    #[arg(long, conflicts_with = "projection")]
    map: Option<PathBuf>,

    /// Use a predefined projection
    #[arg(long, value_enum)]
    projection: Option<ProjectionPreset>,

    /// 1 = delete intermediate files, 0 = keep them (default: 0)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    delete: Option<u8>,

    /// Directory containing .IMG files (default: current directory)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Save the per-stage run summary as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl RunArgs {
    fn map_source(&self) -> Result<MapSource> {
        match (&self.map, self.projection) {
            (Some(path), _) => Ok(MapSource::File(path.clone())),
            (None, Some(preset)) => Ok(MapSource::Preset(preset)),
            (None, None) => anyhow::bail!("One of --map or --projection is required"),
        }
    }

    fn dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to read current directory"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the processing pipeline (default if no command specified)
    Run,

    /// Show what is in the directory and which stages have work
    Analyze,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "marci-isis.yaml")]
        output: PathBuf,
    },

    /// Write a projection preset to a map template file
    WriteMap {
        /// Preset to write
        #[arg(value_enum)]
        preset: ProjectionPreset,

        /// Output path (default: <preset>.map)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let args = std::env::args_os().map(|a| a.to_string_lossy().into_owned());
            report_usage_error(&e, &log_file_from_args(args), logging::init_logging);
            process::exit(1);
        }
    };

    if let Err(e) = logging::init_logging(Some(&cli.log_file)) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }

    if let Err(e) = dispatch(cli) {
        tracing::error!("{:#}", e);
        process::exit(1);
    }
}

/// Where an argument error ended up.
#[derive(Debug, PartialEq, Eq)]
enum Reported {
    LogFile,
    Console,
    Stderr,
}

/// Log an argument error, falling back to a console-only subscriber and then
/// to plain stderr.
fn report_usage_error<F>(error: &clap::Error, log_file: &Path, init: F) -> Reported
where
    F: Fn(Option<&Path>) -> Result<()>,
{
    let message = error.to_string();
    let message = message.trim_end();

    let reported = match init(Some(log_file)) {
        Ok(()) => Reported::LogFile,
        Err(e) => {
            eprintln!("Warning: {:#}", e);
            match init(None) {
                Ok(()) => Reported::Console,
                Err(_) => Reported::Stderr,
            }
        }
    };

    match reported {
        Reported::Stderr => eprintln!("{}", message),
        _ => tracing::error!("{}", message),
    }
    reported
}

/// Best-effort `--log-file` lookup for when full argument parsing failed.
fn log_file_from_args<I: IntoIterator<Item = String>>(args: I) -> PathBuf {
    let mut args = args.into_iter();
    let mut log_file = PathBuf::from(DEFAULT_LOG_FILE);
    while let Some(arg) = args.next() {
        if arg == "--" {
            break;
        }
        if arg == "--log-file" {
            if let Some(value) = args.next() {
                log_file = PathBuf::from(value);
            }
        } else if let Some(value) = arg.strip_prefix("--log-file=") {
            log_file = PathBuf::from(value);
        }
    }
    log_file
}

fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        None | Some(Commands::Run) => run_command(config_path, &cli.run),
        Some(Commands::Analyze) => analyze_command(&cli.run.dir()?),
        Some(Commands::Validate) => validate_command(config_path),
        Some(Commands::GenerateConfig { output }) => generate_config_command(&output),
        Some(Commands::WriteMap { preset, output }) => {
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.map", preset)));
            preset.template().write_to(&output)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn run_command(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let mut config = load_config(config_path)?;

    // Apply overrides
    if let Some(path) = &args.summary_json {
        config.pipeline.summary_output_path = Some(path.clone());
    }

    let request = RunRequest {
        dir: args.dir()?,
        map: args.map_source()?,
        delete_intermediate: args.delete.map(|d| d == 1),
    };
    let options = prepare_run(&config, &request)?;

    let runtime = build_runtime()?;
    let summary = runtime.block_on(run_pipeline(ProcessRunner::new(), options));
    summary.log();

    if let Some(path) = &config.pipeline.summary_output_path {
        // The run itself is done; a summary write failure does not change the exit code
        if let Err(e) = summary.save_to_file(path) {
            tracing::error!("Failed to save run summary to {}: {:#}", path.display(), e);
        }
    }

    Ok(())
}

fn analyze_command(dir: &Path) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Input directory not found: {}", dir.display()))?;
    let items = inventory(&dir)?;
    let count = |kind: ProductKind| items.iter().filter(|i| i.kind == kind).count();

    println!("\n=== Work Analysis ===");
    println!("Directory: {}", dir.display());
    for kind in ProductKind::ALL {
        println!("{:<14} {}", format!("{}:", kind.label()), count(kind));
    }

    println!("\n=== Stage Inputs ===");
    for stage in Stage::ALL {
        println!(
            "{:<10} {} {}",
            format!("{}:", stage),
            count(stage.input()),
            stage.input().label()
        );
    }
    println!("=====================\n");

    Ok(())
}

fn validate_command(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: &Path) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# MARCI ISIS Pipeline Configuration

# === TOOLS: ISIS programs run by each stage ===
tools:
  # Directory holding the ISIS binaries. Omit to resolve tools through PATH.
  # isis_bin: "/opt/isis/bin"

  marci2isis: "marci2isis"
  spiceinit: "spiceinit"
  marcical: "marcical"
  explode: "explode"
  cam2map: "cam2map"
  isis2std: "isis2std"

# === SPICE: kernel initialization ===
spice:
  # Retry a failed spiceinit once with web=true (SPICE Web Services)
  web_fallback: true

# === PIPELINE: cleanup and reporting ===
pipeline:
  # Delete each stage's input once its output exists (--delete overrides)
  delete_intermediate: false

  # Only delete a level-1 cube once explode has written at least one band.
  # Off by default: explode deletes its input as soon as it succeeds.
  verify_band_outputs: false

  # Save per-stage success/failure counts as JSON (--summary-json overrides)
  # summary_output_path: "marci-summary.json"
"#;

    std::fs::write(output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
