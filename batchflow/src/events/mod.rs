//! Lifecycle events.
//!
//! Jobs, steps and the chunk orchestrator report progress through an
//! [`EventSink`]. Payloads are JSON objects carrying at least the step or job
//! name.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The events emitted during a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A job started.
    #[serde(rename = "job.started")]
    JobStarted,
    /// A job completed.
    #[serde(rename = "job.completed")]
    JobCompleted,
    /// A job failed.
    #[serde(rename = "job.failed")]
    JobFailed,
    /// A step started.
    #[serde(rename = "step.started")]
    StepStarted,
    /// A step completed.
    #[serde(rename = "step.completed")]
    StepCompleted,
    /// A step failed.
    #[serde(rename = "step.failed")]
    StepFailed,
    /// A chunk or item transaction committed.
    #[serde(rename = "chunk.committed")]
    ChunkCommitted,
    /// A chunk transaction rolled back.
    #[serde(rename = "chunk.rolled_back")]
    ChunkRolledBack,
    /// A rolled back chunk is being reprocessed one item at a time.
    #[serde(rename = "chunk.isolating")]
    ChunkIsolating,
    /// An operation is attempted again.
    #[serde(rename = "item.retry")]
    ItemRetry,
    /// An item was skipped.
    #[serde(rename = "item.skipped")]
    ItemSkipped,
}

impl EventType {
    /// Returns the dotted event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JobStarted => "job.started",
            Self::JobCompleted => "job.completed",
            Self::JobFailed => "job.failed",
            Self::StepStarted => "step.started",
            Self::StepCompleted => "step.completed",
            Self::StepFailed => "step.failed",
            Self::ChunkCommitted => "chunk.committed",
            Self::ChunkRolledBack => "chunk.rolled_back",
            Self::ChunkIsolating => "chunk.isolating",
            Self::ItemRetry => "item.retry",
            Self::ItemSkipped => "item.skipped",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for event in [
            EventType::JobStarted,
            EventType::StepFailed,
            EventType::ChunkRolledBack,
            EventType::ItemSkipped,
        ] {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, event.as_str());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(EventType::ChunkIsolating.to_string(), "chunk.isolating");
    }
}
