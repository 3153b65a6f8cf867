//! MARCI ISIS Pipeline
//!
//! Drives raw MRO MARCI images (`*.IMG`) through the ISIS toolchain into
//! map-projected PNGs. Every image operation is done by an external ISIS
//! program; this crate finds the files, builds the command lines, runs the
//! tools in order and cleans up intermediates on request.
//!
//! # Architecture
//!
//! - **Config**: tool names, SPICE fallback and cleanup settings (YAML/JSON)
//! - **Projection**: map template presets and custom template resolution
//! - **Exec**: subprocess runner with logged output and one-shot fallback
//! - **Pipeline**: typed work items, the six stages, per-stage result counts
//!
//! # Usage
//!
//! ```no_run
//! use marci_isis::{build_runtime, prepare_run, run_pipeline, Config, RunRequest};
//! use marci_isis::exec::ProcessRunner;
//! use marci_isis::projection::{MapSource, ProjectionPreset};
//!
//! fn main() -> anyhow::Result<()> {
//!     let request = RunRequest {
//!         dir: ".".into(),
//!         map: MapSource::Preset(ProjectionPreset::Polar),
//!         delete_intermediate: Some(false),
//!     };
//!     let options = prepare_run(&Config::default(), &request)?;
//!     let summary = build_runtime()?.block_on(run_pipeline(ProcessRunner::new(), options));
//!     summary.log();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod projection;

pub use config::Config;
pub use pipeline::{Pipeline, RunOptions, RunSummary, Stage, StageContext};

use anyhow::{Context, Result};
use exec::CommandRunner;
use projection::MapSource;
use std::path::PathBuf;
use tracing::Instrument;

/// What the user asked to process.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Directory holding the `*.IMG` files
    pub dir: PathBuf,

    /// Map template source
    pub map: MapSource,

    /// Overrides `pipeline.delete_intermediate` when set
    pub delete_intermediate: Option<bool>,
}

/// Validate everything that can be checked up front and build run options.
///
/// No tool is run here; any error means the run must not start.
pub fn prepare_run(config: &Config, request: &RunRequest) -> Result<RunOptions> {
    config.validate()?;

    let dir = request
        .dir
        .canonicalize()
        .with_context(|| format!("Input directory not found: {}", request.dir.display()))?;
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }

    let map_template = request.map.resolve(&dir)?;
    let delete_intermediate = request
        .delete_intermediate
        .unwrap_or(config.pipeline.delete_intermediate);

    tracing::info!("Using map: {}", map_template.display());
    tracing::info!("Processing directory: {}", dir.display());
    tracing::info!(
        "Delete intermediate files: {}",
        if delete_intermediate { "Yes" } else { "No" }
    );

    Ok(RunOptions {
        context: StageContext {
            dir,
            map_template,
            tools: config.tools.clone(),
            spice_web_fallback: config.spice.web_fallback,
            verify_band_outputs: config.pipeline.verify_band_outputs,
        },
        delete_intermediate,
    })
}

/// Run all six stages with the given runner.
pub async fn run_pipeline<R: CommandRunner>(runner: R, options: RunOptions) -> RunSummary {
    let span = tracing::info_span!("run", dir = %options.context.dir.display());

    async move {
        tracing::info!("Starting MARCI ISIS pipeline");
        let mut pipeline = Pipeline::new(runner, options);
        pipeline.run().await
    }
    .instrument(span)
    .await
}

/// Build the single-threaded Tokio runtime used to drive child processes.
pub fn build_runtime() -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_current_thread();
    builder.enable_all();
    Ok(builder.build()?)
}
