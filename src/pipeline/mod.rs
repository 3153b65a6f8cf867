//! Pipeline orchestration for MARCI image processing.

mod metrics;
mod runner;
mod stages;
mod work_item;

#[cfg(test)]
mod pipeline_integration_tests;

pub use metrics::{RunRecorder, RunSummary, StageStats};
pub use runner::{Pipeline, RunOptions};
pub use stages::{Deletion, Stage, StageContext, StagePlan};
pub use work_item::{discover, inventory, ProductKind, WorkItem};
