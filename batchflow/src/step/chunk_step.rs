//! The chunk-oriented step.

use super::{Step, StepExecution, StepListener};
use crate::chunk::ChunkOrchestrator;
use crate::config::BatchConfig;
use crate::core::{ExecutionStatus, StepExecutionStats};
use crate::events::{EventSink, EventType};
use crate::items::{ItemSink, ItemSource, ItemTransformer, TransactionManager};
use crate::policy::FaultTolerance;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

/// A step that reads, transforms and writes items in chunks.
///
/// Built with [`super::StepBuilder`]. Policies are fixed at build time.
pub struct ChunkStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    pub(super) name: String,
    pub(super) config: BatchConfig,
    pub(super) policies: FaultTolerance,
    pub(super) source: Box<dyn ItemSource<I>>,
    pub(super) transformer: Arc<dyn ItemTransformer<I, O>>,
    pub(super) sink: Arc<dyn ItemSink<O>>,
    pub(super) transactions: Arc<dyn TransactionManager>,
    pub(super) listeners: Vec<Arc<dyn StepListener>>,
}

impl<I, O> ChunkStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Returns the configuration the step was built with.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Returns the step's policies.
    #[must_use]
    pub fn policies(&self) -> &FaultTolerance {
        &self.policies
    }

    async fn run(&mut self, events: &dyn EventSink) -> StepExecution {
        let mut stats = StepExecutionStats::new(&self.name);
        stats.start();
        info!(
            chunk_size = self.config.chunk_size,
            skip_limit = self.policies.skip_policy.skip_limit(),
            retry_limit = self.config.retry_limit,
            "Step started"
        );

        for listener in &self.listeners {
            listener.before_step(&stats).await;
        }
        events
            .emit(EventType::StepStarted, serde_json::json!({ "step": self.name }))
            .await;

        let result = {
            let mut orchestrator = ChunkOrchestrator::new(
                &self.name,
                self.config.chunk_size,
                &self.policies,
                &mut *self.source,
                &*self.transformer,
                &*self.sink,
            )
            .with_transactions(&*self.transactions)
            .with_events(events);
            orchestrator.run(&mut stats).await
        };

        let status = if result.is_ok() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        if let Err(failure) = &result {
            stats.failures.push(failure.to_string());
        }
        stats.finish(status);

        match &result {
            Ok(()) => info!(
                read = stats.read_count,
                written = stats.write_count,
                filtered = stats.filter_count,
                skipped = stats.skip_count(),
                commits = stats.commit_count,
                rollbacks = stats.rollback_count,
                "Step completed"
            ),
            Err(failure) => error!(
                read = stats.read_count,
                written = stats.write_count,
                skipped = stats.skip_count(),
                error = %failure,
                "Step failed"
            ),
        }

        for listener in &self.listeners {
            listener.after_step(&stats, status).await;
        }
        let event = if status.is_success() {
            EventType::StepCompleted
        } else {
            EventType::StepFailed
        };
        events.emit(event, stats.to_json()).await;

        StepExecution {
            stats,
            failure: result.err(),
        }
    }
}

impl<I, O> fmt::Debug for ChunkStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkStep")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<I, O> Step for ChunkStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&mut self, events: &dyn EventSink) -> StepExecution {
        let span = info_span!("step", step = %self.name);
        self.run(events).instrument(span).await
    }
}
