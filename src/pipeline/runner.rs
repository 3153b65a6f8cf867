//! Sequential stage runner.
//!
//! Stages run strictly in order and every file of a stage is finished before
//! the next stage looks at the directory. A failed command is logged and the
//! run moves on to the next file; nothing short of a bad configuration stops
//! the run.

use super::metrics::{RunRecorder, RunSummary, StageStats};
use super::{discover, Deletion, Stage, StageContext, WorkItem};
use crate::exec::{CommandRunner, Executor, Outcome};
use std::time::Instant;
use tracing::Instrument;

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub context: StageContext,
    pub delete_intermediate: bool,
}

/// Drives the six stages over one directory.
pub struct Pipeline<R> {
    executor: Executor<R>,
    options: RunOptions,
}

impl<R: CommandRunner> Pipeline<R> {
    pub fn new(runner: R, options: RunOptions) -> Self {
        Self {
            executor: Executor::new(runner),
            options,
        }
    }

    pub fn runner(&self) -> &R {
        self.executor.runner()
    }

    /// Run every stage in order.
    pub async fn run(&mut self) -> RunSummary {
        let mut recorder = RunRecorder::new();

        for stage in Stage::ALL {
            let span = tracing::info_span!("stage", name = stage.name());
            let stats = self.run_stage(stage).instrument(span).await;
            recorder.record(stats);
        }

        tracing::info!("MARCI processing complete.");
        recorder.finish()
    }

    /// Run one stage over every matching file.
    pub async fn run_stage(&mut self, stage: Stage) -> StageStats {
        let start = Instant::now();
        let mut stats = StageStats::new(stage);
        let dir = self.options.context.dir.clone();

        let items = match discover(&dir, stage.input()) {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("Failed to list {} for {}: {:#}", stage.input().label(), stage, e);
                stats.elapsed = start.elapsed();
                return stats;
            }
        };

        if items.is_empty() {
            tracing::info!("No {} to process", stage.input().label());
        } else {
            tracing::info!("Processing {} {}", items.len(), stage.input().label());
        }

        for item in &items {
            stats.matched += 1;
            self.process_item(stage, item, &mut stats).await;
        }

        stats.elapsed = start.elapsed();
        stats
    }

    async fn process_item(&mut self, stage: Stage, item: &WorkItem, stats: &mut StageStats) {
        let plan = stage.plan(item, &self.options.context);

        let outcome = self
            .executor
            .execute_with_fallback(&plan.invocation, &plan.fail_message, plan.fallback.as_ref())
            .await;

        if outcome != Outcome::Succeeded && plan.fallback.is_some() {
            stats.fallbacks += 1;
        }
        match outcome {
            Outcome::Succeeded => stats.succeeded += 1,
            Outcome::Recovered => {
                stats.succeeded += 1;
                stats.recovered += 1;
            }
            Outcome::Failed => {
                stats.failed += 1;
                return;
            }
        }

        if self.options.delete_intermediate {
            self.delete_input(item, &plan.deletion, stats);
        }
    }

    fn delete_input(&self, item: &WorkItem, deletion: &Deletion, stats: &mut StageStats) {
        if !deletion.permits(&self.options.context.dir) {
            if *deletion != Deletion::Never {
                tracing::debug!("Keeping {}: expected output not found", item);
            }
            return;
        }

        match std::fs::remove_file(&item.path) {
            Ok(()) => {
                tracing::info!("Deleted: {}", item);
                stats.deleted += 1;
            }
            Err(e) => {
                tracing::error!("Failed to delete {}: {}", item, e);
                stats.delete_failures += 1;
            }
        }
    }
}
