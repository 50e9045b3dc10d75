//! Builder for jobs.

use super::{Job, JobListener};
use crate::errors::BatchError;
use crate::events::{EventSink, NoOpEventSink};
use crate::step::Step;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for [`Job`].
///
/// ```rust,ignore
/// let mut job = JobBuilder::new("import-products")
///     .start(extract)
///     .next(load)
///     .listener(Arc::new(LoggingJobListener::new()))
///     .build()?;
/// let execution = job.run().await;
/// std::process::exit(execution.exit_code());
/// ```
pub struct JobBuilder {
    name: String,
    steps: Vec<Box<dyn Step>>,
    listeners: Vec<Arc<dyn JobListener>>,
    events: Arc<dyn EventSink>,
}

impl JobBuilder {
    /// Creates a new job builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            listeners: Vec::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the first step, discarding any steps added before.
    #[must_use]
    pub fn start(mut self, step: impl Step + 'static) -> Self {
        self.steps.clear();
        self.steps.push(Box::new(step));
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn next(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Appends an already boxed step.
    #[must_use]
    pub fn boxed_step(mut self, step: Box<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Adds a lifecycle listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the event sink shared by the job and its steps.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Builds the job.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::EmptyJob`] if no step was added, or
    /// [`BatchError::InvalidConfig`] if two steps share a name.
    pub fn build(self) -> Result<Job, BatchError> {
        if self.steps.is_empty() {
            return Err(BatchError::EmptyJob(self.name));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(BatchError::InvalidConfig(format!(
                    "Job '{}' has more than one step named '{}'",
                    self.name,
                    step.name()
                )));
            }
        }

        Ok(Job {
            name: self.name,
            steps: self.steps,
            listeners: self.listeners,
            events: self.events,
        })
    }
}

impl std::fmt::Debug for JobBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobBuilder")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
