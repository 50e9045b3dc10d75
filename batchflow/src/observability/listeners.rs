//! Listeners that log detailed step and job summaries.

use crate::core::{ExecutionStatus, JobExecutionStats, StepExecutionStats};
use crate::job::JobListener;
use crate::step::StepListener;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Items written per second, if the step ran for a measurable time.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn throughput(stats: &StepExecutionStats) -> Option<f64> {
    let millis = stats.duration()?.num_milliseconds();
    if millis <= 0 {
        return None;
    }
    Some(stats.write_count as f64 * 1000.0 / millis as f64)
}

/// Logs the full counter set of every step when it finishes.
///
/// Warns when the step skipped items or rolled back transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStepListener;

impl LoggingStepListener {
    /// Creates a new logging step listener.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepListener for LoggingStepListener {
    async fn before_step(&self, stats: &StepExecutionStats) {
        info!(
            step = %stats.step_name,
            start_time = ?stats.start_time,
            "Starting step"
        );
    }

    async fn after_step(&self, stats: &StepExecutionStats, status: ExecutionStatus) {
        info!(
            step = %stats.step_name,
            status = %status,
            read = stats.read_count,
            written = stats.write_count,
            filtered = stats.filter_count,
            read_skips = stats.read_skip_count,
            process_skips = stats.process_skip_count,
            write_skips = stats.write_skip_count,
            commits = stats.commit_count,
            rollbacks = stats.rollback_count,
            retries = stats.retry_count,
            duration_ms = stats.duration().map(|d| d.num_milliseconds()),
            items_per_sec = throughput(stats),
            success_rate = stats.success_rate(),
            "Step finished"
        );

        if stats.skip_count() > 0 {
            warn!(
                step = %stats.step_name,
                skipped = stats.skip_count(),
                "Step skipped items, review the input data"
            );
        }
        if stats.rollback_count > 0 {
            warn!(
                step = %stats.step_name,
                rollbacks = stats.rollback_count,
                "Step rolled back transactions"
            );
        }
        for failure in &stats.failures {
            error!(step = %stats.step_name, error = %failure, "Step failure");
        }
    }
}

/// Advice derived from a finished job.
#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation {
    /// The job failed.
    ReviewFailure,
    /// The job ran longer than the slow-job threshold.
    SlowJob {
        /// Job duration in seconds.
        seconds: i64,
    },
    /// More items were skipped than the skip-rate threshold allows.
    HighSkipRate {
        /// Skipped items as a percentage of read items.
        percent: f64,
    },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReviewFailure => {
                write!(f, "Review the step configurations and input data for errors")
            }
            Self::SlowJob { seconds } => write!(
                f,
                "Job took {seconds} seconds, consider a larger chunk size or splitting the input"
            ),
            Self::HighSkipRate { percent } => {
                write!(f, "High skip rate ({percent:.1}%), review input data quality")
            }
        }
    }
}

/// Logs aggregated totals, a per-step summary, failures and
/// recommendations when a job finishes.
#[derive(Debug, Clone)]
pub struct LoggingJobListener {
    slow_job: Duration,
    skip_rate_percent: f64,
}

impl Default for LoggingJobListener {
    fn default() -> Self {
        Self {
            slow_job: Duration::from_secs(300),
            skip_rate_percent: 10.0,
        }
    }
}

impl LoggingJobListener {
    /// Creates a listener with the default thresholds (300 s, 10 %).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the duration above which a job counts as slow.
    #[must_use]
    pub fn with_slow_job_threshold(mut self, threshold: Duration) -> Self {
        self.slow_job = threshold;
        self
    }

    /// Sets the skip rate, in percent, above which a warning is logged.
    #[must_use]
    pub fn with_skip_rate_threshold(mut self, percent: f64) -> Self {
        self.skip_rate_percent = percent;
        self
    }

    /// Returns the recommendations for a finished job.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn recommendations(
        &self,
        stats: &JobExecutionStats,
        status: ExecutionStatus,
    ) -> Vec<Recommendation> {
        if !status.is_success() {
            return vec![Recommendation::ReviewFailure];
        }

        let mut out = Vec::new();
        if let Some(duration) = stats.duration() {
            let slow = duration
                .to_std()
                .is_ok_and(|elapsed| elapsed > self.slow_job);
            if slow {
                out.push(Recommendation::SlowJob {
                    seconds: duration.num_seconds(),
                });
            }
        }

        let read = stats.total_read();
        if read > 0 {
            let percent = stats.total_skipped() as f64 / read as f64 * 100.0;
            if percent > self.skip_rate_percent {
                out.push(Recommendation::HighSkipRate { percent });
            }
        }
        out
    }
}

#[async_trait]
impl JobListener for LoggingJobListener {
    async fn before_job(&self, stats: &JobExecutionStats) {
        info!(
            job = %stats.job_name,
            execution_id = %stats.execution_id,
            start_time = ?stats.start_time,
            "Starting job"
        );
    }

    async fn after_job(&self, stats: &JobExecutionStats, status: ExecutionStatus) {
        info!(
            job = %stats.job_name,
            status = %status,
            duration_secs = stats.duration().map(|d| d.num_seconds()),
            steps = stats.steps.len(),
            read = stats.total_read(),
            written = stats.total_written(),
            filtered = stats.total_filtered(),
            skipped = stats.total_skipped(),
            commits = stats.total_commits(),
            rollbacks = stats.total_rollbacks(),
            success_rate = stats.success_rate(),
            "Job finished"
        );

        for step in &stats.steps {
            info!(
                step = %step.step_name,
                status = %step.status,
                read = step.read_count,
                written = step.write_count,
                skipped = step.skip_count(),
                "Step summary"
            );
            if !step.failures.is_empty() {
                error!(
                    step = %step.step_name,
                    failures = step.failures.len(),
                    "Step had failures"
                );
            }
        }

        for recommendation in self.recommendations(stats, status) {
            match recommendation {
                Recommendation::ReviewFailure => {
                    error!(job = %stats.job_name, "Recommendation: {recommendation}");
                }
                Recommendation::SlowJob { .. } => {
                    info!(job = %stats.job_name, "Recommendation: {recommendation}");
                }
                Recommendation::HighSkipRate { .. } => {
                    warn!(job = %stats.job_name, "Recommendation: {recommendation}");
                }
            }
        }
    }
}
