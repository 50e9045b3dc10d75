//! Steps: one chunk-oriented unit of work within a job.
//!
//! A [`ChunkStep`] wraps a single [`crate::chunk::ChunkOrchestrator`] run. It
//! creates fresh [`StepExecutionStats`], calls its [`StepListener`]s before
//! and after the run, and reports the terminal status. A step that failed is
//! never resumed automatically.

mod builder;
mod chunk_step;


pub use builder::StepBuilder;
pub use chunk_step::ChunkStep;

use crate::core::{ExecutionStatus, StepExecutionStats};
use crate::errors::StepFailure;
use crate::events::EventSink;
use async_trait::async_trait;

/// A unit of work that a job runs in sequence.
#[async_trait]
pub trait Step: Send {
    /// Returns the step name.
    fn name(&self) -> &str;

    /// Runs the step to a terminal status.
    ///
    /// Failures are reported through [`StepExecution::failure`], never as a
    /// panic or an early return, so that the accumulated statistics survive.
    async fn execute(&mut self, events: &dyn EventSink) -> StepExecution;
}

/// Lifecycle hooks around a step run.
///
/// Hooks receive read-only views; default implementations do nothing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepListener: Send + Sync {
    /// Called before the first chunk is read.
    async fn before_step(&self, _stats: &StepExecutionStats) {}

    /// Called once the step reached a terminal status.
    async fn after_step(&self, _stats: &StepExecutionStats, _status: ExecutionStatus) {}
}

/// The outcome of one step run.
#[derive(Debug)]
pub struct StepExecution {
    /// Final statistics.
    pub stats: StepExecutionStats,
    /// The failure that terminated the step, if it failed.
    pub failure: Option<StepFailure>,
}

impl StepExecution {
    /// Returns the terminal status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.stats.status
    }

    /// Returns true if the step completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.stats.status.is_success()
    }

    /// Returns the stats, or the failure if the step failed.
    ///
    /// # Errors
    ///
    /// Returns the [`StepFailure`] that terminated the step.
    pub fn into_result(self) -> Result<StepExecutionStats, StepFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.stats),
        }
    }
}
