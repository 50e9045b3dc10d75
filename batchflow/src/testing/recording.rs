//! A listener that records every lifecycle hook it receives.

use crate::core::{ExecutionStatus, JobExecutionStats, StepExecutionStats};
use crate::job::JobListener;
use crate::step::StepListener;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Records hook invocations as strings such as `"before_step:load"` or
/// `"after_job:etl:COMPLETED"`, plus the stats each `after_step` received.
#[derive(Debug, Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<String>>,
    step_stats: Mutex<Vec<StepExecutionStats>>,
}

impl RecordingListener {
    /// Creates a new recording listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded hook calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns the stats passed to each `after_step` call.
    #[must_use]
    pub fn step_stats(&self) -> Vec<StepExecutionStats> {
        self.step_stats.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl StepListener for RecordingListener {
    async fn before_step(&self, stats: &StepExecutionStats) {
        self.record(format!("before_step:{}", stats.step_name));
    }

    async fn after_step(&self, stats: &StepExecutionStats, status: ExecutionStatus) {
        self.record(format!("after_step:{}:{status}", stats.step_name));
        self.step_stats.lock().push(stats.clone());
    }
}

#[async_trait]
impl JobListener for RecordingListener {
    async fn before_job(&self, stats: &JobExecutionStats) {
        self.record(format!("before_job:{}", stats.job_name));
    }

    async fn after_job(&self, stats: &JobExecutionStats, status: ExecutionStatus) {
        self.record(format!("after_job:{}:{status}", stats.job_name));
    }
}
