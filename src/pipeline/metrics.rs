//! Per-stage result counts and the end-of-run summary.

use super::Stage;
use serde::{Serialize, Serializer};
use std::path::Path;
use std::time::{Duration, Instant};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

fn serialize_stage<S>(stage: &Stage, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(stage.name())
}

/// Counts for one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    #[serde(serialize_with = "serialize_stage")]
    pub stage: Stage,

    /// Work items discovered for the stage
    pub matched: u64,

    /// Items whose command succeeded (including via fallback)
    pub succeeded: u64,

    /// Items whose command failed
    pub failed: u64,

    /// Fallback invocations issued
    pub fallbacks: u64,

    /// Items recovered by their fallback
    pub recovered: u64,

    /// Input files deleted
    pub deleted: u64,

    /// Deletions that were permitted but failed
    pub delete_failures: u64,

    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl StageStats {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            matched: 0,
            succeeded: 0,
            failed: 0,
            fallbacks: 0,
            recovered: 0,
            deleted: 0,
            delete_failures: 0,
            elapsed: Duration::ZERO,
        }
    }
}

impl std::fmt::Display for StageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} matched, {} succeeded, {} failed",
            self.stage, self.matched, self.succeeded, self.failed
        )?;
        if self.fallbacks > 0 {
            write!(f, ", {} fallbacks ({} recovered)", self.fallbacks, self.recovered)?;
        }
        if self.deleted > 0 || self.delete_failures > 0 {
            write!(f, ", {} deleted", self.deleted)?;
        }
        if self.delete_failures > 0 {
            write!(f, " ({} delete failures)", self.delete_failures)?;
        }
        write!(f, " in {:.1}s", self.elapsed.as_secs_f64())
    }
}

/// Summary of a whole pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stages: Vec<StageStats>,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn stage(&self, stage: Stage) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn total_succeeded(&self) -> u64 {
        self.stages.iter().map(|s| s.succeeded).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.stages.iter().map(|s| s.failed).sum()
    }

    pub fn total_deleted(&self) -> u64 {
        self.stages.iter().map(|s| s.deleted).sum()
    }

    /// Save the summary to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Run summary saved to {}", path.display());
        Ok(())
    }

    /// Log one line per stage plus the totals.
    pub fn log(&self) {
        for stats in &self.stages {
            if stats.failed > 0 {
                tracing::warn!("{}", stats);
            } else {
                tracing::info!("{}", stats);
            }
        }
        tracing::info!("{}", self);
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Commands: {} succeeded, {} failed | Deleted: {} | Elapsed: {:.1}s",
            self.total_succeeded(),
            self.total_failed(),
            self.total_deleted(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Collects stage stats as the run progresses.
pub struct RunRecorder {
    stages: Vec<StageStats>,
    start_time: Instant,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self {
            stages: Vec::with_capacity(Stage::ALL.len()),
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, stats: StageStats) {
        self.stages.push(stats);
    }

    pub fn finish(self) -> RunSummary {
        RunSummary {
            stages: self.stages,
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for RunRecorder {
    fn default() -> Self {
        Self::new()
    }
}
