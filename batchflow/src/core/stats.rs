//! Step and job execution statistics.
//!
//! A [`StepExecutionStats`] is mutated only by the step that owns it while the
//! step is running. Once the step reaches a terminal status the value is
//! handed to listeners and to the job by shared reference or by move, never
//! mutated again.

use super::{ExecutionStatus, Phase};
use crate::utils::{generate_uuid, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counters and timing for one step execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecutionStats {
    /// Step name.
    pub step_name: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// Items successfully read from the source.
    pub read_count: u64,
    /// Items persisted in committed transactions.
    pub write_count: u64,
    /// Items the transformer filtered out.
    pub filter_count: u64,
    /// Records skipped while reading.
    pub read_skip_count: u64,
    /// Items skipped while transforming.
    pub process_skip_count: u64,
    /// Items skipped while writing.
    pub write_skip_count: u64,
    /// Committed transactions.
    pub commit_count: u64,
    /// Rolled back transactions.
    pub rollback_count: u64,
    /// Re-attempts granted by the retry policy.
    pub retry_count: u64,
    /// When the step started.
    pub start_time: Option<Timestamp>,
    /// When the step reached a terminal status.
    pub end_time: Option<Timestamp>,
    /// Messages of the failures that terminated the step.
    pub failures: Vec<String>,
}

impl StepExecutionStats {
    /// Creates zeroed stats for a step.
    #[must_use]
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: ExecutionStatus::Starting,
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            read_skip_count: 0,
            process_skip_count: 0,
            write_skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
            retry_count: 0,
            start_time: None,
            end_time: None,
            failures: Vec::new(),
        }
    }

    /// Marks the step as started.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Started;
        self.start_time = Some(now_utc());
    }

    /// Marks the step as finished with a terminal status.
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.end_time = Some(now_utc());
    }

    /// Total number of skipped items across all phases.
    #[must_use]
    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.process_skip_count + self.write_skip_count
    }

    /// Records a skip in the given phase.
    pub fn record_skip(&mut self, phase: Phase) {
        match phase {
            Phase::Read => self.read_skip_count += 1,
            Phase::Process => self.process_skip_count += 1,
            Phase::Write => self.write_skip_count += 1,
        }
    }

    /// Returns the skip count for one phase.
    #[must_use]
    pub fn skip_count_for(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Read => self.read_skip_count,
            Phase::Process => self.process_skip_count,
            Phase::Write => self.write_skip_count,
        }
    }

    /// Returns the wall-clock duration, if the step has finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }

    /// Percentage of read items that were not skipped.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        if self.read_count == 0 {
            return None;
        }
        let kept = self.read_count.saturating_sub(self.skip_count());
        Some(kept as f64 / self.read_count as f64 * 100.0)
    }

    /// Converts to a JSON payload for event sinks.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "step": self.step_name,
            "status": self.status.to_string(),
            "read": self.read_count,
            "written": self.write_count,
            "filtered": self.filter_count,
            "skipped": self.skip_count(),
            "read_skips": self.read_skip_count,
            "process_skips": self.process_skip_count,
            "write_skips": self.write_skip_count,
            "commits": self.commit_count,
            "rollbacks": self.rollback_count,
            "retries": self.retry_count,
        })
    }
}

/// Aggregated statistics for one job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionStats {
    /// Unique id of this execution.
    pub execution_id: Uuid,
    /// Job name.
    pub job_name: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// When the job started.
    pub start_time: Option<Timestamp>,
    /// When the job reached a terminal status.
    pub end_time: Option<Timestamp>,
    /// Stats of every step that ran, in execution order.
    pub steps: Vec<StepExecutionStats>,
}

impl JobExecutionStats {
    /// Creates empty stats for a job.
    #[must_use]
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            execution_id: generate_uuid(),
            job_name: job_name.into(),
            status: ExecutionStatus::Starting,
            start_time: None,
            end_time: None,
            steps: Vec::new(),
        }
    }

    /// Marks the job as started.
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Started;
        self.start_time = Some(now_utc());
    }

    /// Marks the job as finished with a terminal status.
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.end_time = Some(now_utc());
    }

    /// Returns the stats of a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepExecutionStats> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    /// Total items read across steps.
    #[must_use]
    pub fn total_read(&self) -> u64 {
        self.steps.iter().map(|s| s.read_count).sum()
    }

    /// Total items written across steps.
    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.steps.iter().map(|s| s.write_count).sum()
    }

    /// Total items filtered across steps.
    #[must_use]
    pub fn total_filtered(&self) -> u64 {
        self.steps.iter().map(|s| s.filter_count).sum()
    }

    /// Total items skipped across steps.
    #[must_use]
    pub fn total_skipped(&self) -> u64 {
        self.steps.iter().map(StepExecutionStats::skip_count).sum()
    }

    /// Total commits across steps.
    #[must_use]
    pub fn total_commits(&self) -> u64 {
        self.steps.iter().map(|s| s.commit_count).sum()
    }

    /// Total rollbacks across steps.
    #[must_use]
    pub fn total_rollbacks(&self) -> u64 {
        self.steps.iter().map(|s| s.rollback_count).sum()
    }

    /// Percentage of read items that were not skipped, over all steps.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        let read = self.total_read();
        if read == 0 {
            return None;
        }
        let kept = read.saturating_sub(self.total_skipped());
        Some(kept as f64 / read as f64 * 100.0)
    }

    /// Returns the wall-clock duration, if the job has finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }

    /// Converts to a JSON payload for event sinks.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "job": self.job_name,
            "execution_id": self.execution_id.to_string(),
            "status": self.status.to_string(),
            "steps": self.steps.len(),
            "read": self.total_read(),
            "written": self.total_written(),
            "filtered": self.total_filtered(),
            "skipped": self.total_skipped(),
            "commits": self.total_commits(),
            "rollbacks": self.total_rollbacks(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(name: &str, read: u64, written: u64, skipped_in_process: u64) -> StepExecutionStats {
        let mut stats = StepExecutionStats::new(name);
        stats.read_count = read;
        stats.write_count = written;
        stats.process_skip_count = skipped_in_process;
        stats.commit_count = 1;
        stats
    }

    #[test]
    fn test_new_step_stats_are_zeroed() {
        let stats = StepExecutionStats::new("load");
        assert_eq!(stats.status, ExecutionStatus::Starting);
        assert_eq!(stats.skip_count(), 0);
        assert!(stats.start_time.is_none());
        assert!(stats.duration().is_none());
    }

    #[test]
    fn test_record_skip_by_phase() {
        let mut stats = StepExecutionStats::new("load");
        stats.record_skip(Phase::Read);
        stats.record_skip(Phase::Write);
        stats.record_skip(Phase::Write);

        assert_eq!(stats.read_skip_count, 1);
        assert_eq!(stats.process_skip_count, 0);
        assert_eq!(stats.write_skip_count, 2);
        assert_eq!(stats.skip_count(), 3);
        assert_eq!(stats.skip_count_for(Phase::Write), 2);
    }

    #[test]
    fn test_start_and_finish() {
        let mut stats = StepExecutionStats::new("load");
        stats.start();
        assert_eq!(stats.status, ExecutionStatus::Started);
        stats.finish(ExecutionStatus::Completed);
        assert_eq!(stats.status, ExecutionStatus::Completed);
        assert!(stats.duration().is_some());
    }

    #[test]
    fn test_step_success_rate() {
        let stats = step("load", 10, 8, 2);
        let rate = stats.success_rate().unwrap();
        assert!((rate - 80.0).abs() < f64::EPSILON);
        assert!(StepExecutionStats::new("empty").success_rate().is_none());
    }

    #[test]
    fn test_job_aggregates() {
        let mut job = JobExecutionStats::new("etl");
        job.steps.push(step("load", 10, 9, 1));
        job.steps.push(step("report", 9, 4, 0));

        assert_eq!(job.total_read(), 19);
        assert_eq!(job.total_written(), 13);
        assert_eq!(job.total_skipped(), 1);
        assert_eq!(job.total_commits(), 2);
        assert_eq!(job.step("report").map(|s| s.write_count), Some(4));
        assert!(job.step("missing").is_none());
    }

    #[test]
    fn test_job_to_json() {
        let mut job = JobExecutionStats::new("etl");
        job.steps.push(step("load", 3, 3, 0));
        let json = job.to_json();

        assert_eq!(json["job"], "etl");
        assert_eq!(json["written"], 3);
        assert_eq!(json["status"], "STARTING");
    }

    #[test]
    fn test_step_stats_serialize_roundtrip() {
        let stats = step("load", 5, 4, 1);
        let json = serde_json::to_string(&stats).unwrap();
        let back: StepExecutionStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
