//! Jobs: an ordered list of steps run fail-fast.
//!
//! A [`Job`] runs its steps strictly one after another. The first step that
//! does not complete stops the job; later steps never run. The job reports
//! COMPLETED only when every step completed.

mod builder;
mod executor;

pub use builder::JobBuilder;
pub use executor::Job;

use crate::core::{ExecutionStatus, JobExecutionStats};
use crate::errors::{BatchError, JobFailure};
use async_trait::async_trait;

/// Lifecycle hooks around a job run.
///
/// Hooks receive read-only views; default implementations do nothing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobListener: Send + Sync {
    /// Called before the first step runs.
    async fn before_job(&self, _stats: &JobExecutionStats) {}

    /// Called once the job reached a terminal status, with the aggregate of
    /// every step that ran.
    async fn after_job(&self, _stats: &JobExecutionStats, _status: ExecutionStatus) {}
}

/// The outcome of one job run.
#[derive(Debug)]
pub struct JobExecution {
    /// Aggregated statistics.
    pub stats: JobExecutionStats,
    /// The failure of the step that stopped the job, if any.
    pub failure: Option<JobFailure>,
}

impl JobExecution {
    /// Returns the terminal status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.stats.status
    }

    /// Returns true if every step completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stats.status.is_success()
    }

    /// Process exit code: 0 for COMPLETED, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    /// Returns the stats, or the error of the step that stopped the job.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::StepFailed`] carrying the step's original
    /// failure, or [`BatchError::StepIncomplete`] if the last step did not
    /// complete but reported no failure.
    pub fn into_result(self) -> Result<JobExecutionStats, BatchError> {
        if let Some(failure) = self.failure {
            return Err(failure.into());
        }
        if self.stats.status.is_success() {
            return Ok(self.stats);
        }
        let (step, status) = self
            .stats
            .steps
            .last()
            .map_or_else(
                || (self.stats.job_name.clone(), self.stats.status),
                |s| (s.step_name.clone(), s.status),
            );
        Err(BatchError::StepIncomplete { step, status })
    }
}

#[cfg(test)]
mod tests;
