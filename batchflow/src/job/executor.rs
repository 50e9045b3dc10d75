//! Sequential, fail-fast job execution.

use super::{JobExecution, JobListener};
use crate::core::{ExecutionStatus, JobExecutionStats};
use crate::errors::JobFailure;
use crate::events::{EventSink, EventType};
use crate::step::{Step, StepExecution};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// An ordered list of steps. Built with [`super::JobBuilder`].
pub struct Job {
    pub(super) name: String,
    pub(super) steps: Vec<Box<dyn Step>>,
    pub(super) listeners: Vec<Arc<dyn JobListener>>,
    pub(super) events: Arc<dyn EventSink>,
}

impl Job {
    /// Returns the job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs every step in order until one does not complete.
    ///
    /// Each call is a fresh execution with its own execution id.
    pub async fn run(&mut self) -> JobExecution {
        let stats = JobExecutionStats::new(&self.name);
        let span = info_span!(
            "job",
            job = %self.name,
            execution_id = %stats.execution_id
        );
        self.execute(stats).instrument(span).await
    }

    async fn execute(&mut self, mut stats: JobExecutionStats) -> JobExecution {
        stats.start();
        info!(steps = self.steps.len(), "Job started");

        for listener in &self.listeners {
            listener.before_job(&stats).await;
        }
        self.events
            .emit(
                EventType::JobStarted,
                json!({
                    "job": self.name,
                    "execution_id": stats.execution_id.to_string(),
                    "steps": self.step_names(),
                }),
            )
            .await;

        let mut status = ExecutionStatus::Completed;
        let mut failure = None;
        let total = self.steps.len();

        for (index, step) in self.steps.iter_mut().enumerate() {
            let StepExecution {
                stats: step_stats,
                failure: step_failure,
            } = step.execute(&*self.events).await;

            let completed = step_failure.is_none() && step_stats.status.is_success();
            let step_name = step_stats.step_name.clone();
            stats.steps.push(step_stats);

            if !completed {
                status = ExecutionStatus::Failed;
                failure = step_failure.map(|f| JobFailure::new(&step_name, f));
                let remaining = total - index - 1;
                if remaining > 0 {
                    warn!(
                        step = %step_name,
                        remaining,
                        "Step did not complete, remaining steps will not run"
                    );
                }
                break;
            }
        }

        stats.finish(status);
        match &failure {
            None if status.is_success() => info!(
                read = stats.total_read(),
                written = stats.total_written(),
                skipped = stats.total_skipped(),
                "Job completed"
            ),
            None => error!(status = %status, "Job failed"),
            Some(failure) => error!(
                step = %failure.step,
                error = %failure.source,
                "Job failed"
            ),
        }

        for listener in &self.listeners {
            listener.after_job(&stats, status).await;
        }
        let event = if status.is_success() {
            EventType::JobCompleted
        } else {
            EventType::JobFailed
        };
        self.events.emit(event, stats.to_json()).await;

        JobExecution { stats, failure }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
