//! Logged execution with an optional one-shot fallback.

use super::{CommandRunner, Invocation};

/// Result of executing an invocation (and its fallback, if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The primary invocation succeeded
    Succeeded,
    /// The primary failed and the fallback succeeded
    Recovered,
    /// Nothing succeeded
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed)
    }
}

/// Recovery invocation tried once after the primary fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub invocation: Invocation,
    /// Logged as a warning before the fallback runs
    pub warning: String,
    /// Logged if the fallback fails too
    pub fail_message: String,
}

/// Logs every invocation and turns runner errors into an [`Outcome`].
pub struct Executor<R> {
    runner: R,
}

impl<R: CommandRunner> Executor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run `invocation`, logging `fail_message` alongside the error on failure.
    pub async fn execute(&mut self, invocation: &Invocation, fail_message: &str) -> bool {
        tracing::info!("Running: {}", invocation);
        match self.runner.run(invocation).await {
            Ok(()) => true,
            Err(e) => {
                if fail_message.is_empty() {
                    tracing::error!("Command failed: {}: {:#}", invocation, e);
                } else {
                    tracing::error!("{}\nCommand failed: {}: {:#}", fail_message, invocation, e);
                }
                false
            }
        }
    }

    /// Run `primary`; if it fails, warn and run `fallback` exactly once.
    pub async fn execute_with_fallback(
        &mut self,
        primary: &Invocation,
        fail_message: &str,
        fallback: Option<&Fallback>,
    ) -> Outcome {
        if self.execute(primary, fail_message).await {
            return Outcome::Succeeded;
        }

        let Some(fallback) = fallback else {
            return Outcome::Failed;
        };

        tracing::warn!("{}", fallback.warning);
        if self.execute(&fallback.invocation, &fallback.fail_message).await {
            Outcome::Recovered
        } else {
            Outcome::Failed
        }
    }
}
