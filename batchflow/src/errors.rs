//! Error types for the batchflow engine.
//!
//! Two families live here:
//!
//! - Engine errors ([`BatchError`], [`StepFailure`], [`JobFailure`]) describing why a step,
//!   job or builder could not do its work.
//! - Collaborator errors ([`SourceError`], [`ProcessingError`],
//!   [`ResourceError`]) that sources, transformers and sinks can return so the
//!   standard classification rules recognise them.
//!
//! Collaborators are not limited to these types. Anything that converts into
//! [`Failure`] is accepted and classified by the rule list in
//! [`crate::policy::ExceptionClassifier`].

use crate::core::{ExecutionStatus, Phase};
use crate::policy::{ClassifiedFailure, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A boxed failure raised by a source, transformer, sink or transaction manager.
pub type Failure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for batchflow operations.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A step was built without a required component.
    #[error("Step '{step}' is missing its {component}")]
    MissingComponent {
        /// The step name.
        step: String,
        /// The missing component (source, transformer, sink).
        component: &'static str,
    },

    /// A job was built without any steps.
    #[error("Job '{0}' has no steps")]
    EmptyJob(String),

    /// A step terminated with FAILED status.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        /// The failing step.
        step: String,
        /// The failure that terminated the step.
        #[source]
        source: StepFailure,
    },

    /// A step ended without completing but reported no failure.
    #[error("Step '{step}' ended with status {status}")]
    StepIncomplete {
        /// The step name.
        step: String,
        /// The status the step ended with.
        status: ExecutionStatus,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The failure that terminated a step with FAILED status.
///
/// The original collaborator error is kept intact and exposed through
/// [`std::error::Error::source`] and [`StepFailure::into_source`].
#[derive(Debug, Error)]
#[error("{phase} failure{} ({kind}): {source}", ordinal_suffix(.ordinal))]
pub struct StepFailure {
    /// The phase in which the failure occurred.
    pub phase: Phase,
    /// The ordinal of the offending item, when one could be identified.
    pub ordinal: Option<u64>,
    /// The classified kind of the failure.
    pub kind: ErrorKind,
    /// The original failure.
    #[source]
    pub source: Failure,
}

#[allow(clippy::ref_option)]
fn ordinal_suffix(ordinal: &Option<u64>) -> String {
    ordinal.map_or_else(String::new, |n| format!(" on item #{n}"))
}

impl StepFailure {
    /// Creates a step failure from a classified failure.
    #[must_use]
    pub fn new(phase: Phase, ordinal: Option<u64>, failure: ClassifiedFailure) -> Self {
        Self {
            phase,
            ordinal,
            kind: failure.kind(),
            source: failure.into_error(),
        }
    }

    /// Returns the original failure, discarding the step context.
    #[must_use]
    pub fn into_source(self) -> Failure {
        self.source
    }

    /// Attempts to view the original failure as a concrete type.
    #[must_use]
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

/// The failure that terminated a job: the first step that did not complete.
#[derive(Debug, Error)]
#[error("Step '{step}' failed: {source}")]
pub struct JobFailure {
    /// The failing step.
    pub step: String,
    /// The step's failure.
    #[source]
    pub source: StepFailure,
}

impl JobFailure {
    /// Creates a job failure for a step.
    #[must_use]
    pub fn new(step: impl Into<String>, source: StepFailure) -> Self {
        Self {
            step: step.into(),
            source,
        }
    }
}

impl From<JobFailure> for BatchError {
    fn from(failure: JobFailure) -> Self {
        Self::StepFailed {
            step: failure.step,
            source: failure.source,
        }
    }
}

/// An input record that could not be read or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    /// What went wrong.
    pub message: String,
    /// The raw record text, if available.
    pub record: Option<String>,
    /// The 1-based line number of the record, if available.
    pub line: Option<u64>,
}

impl SourceError {
    /// Creates a new source error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            record: None,
            line: None,
        }
    }

    /// Creates a source error for an invalid record at a known line.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>, record: impl Into<String>, line: u64) -> Self {
        Self {
            message: message.into(),
            record: Some(record.into()),
            line: Some(line),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.record, self.line) {
            (Some(record), Some(line)) => write!(
                f,
                "Invalid record at line {line}: {record}. Error: {}",
                self.message
            ),
            (None, Some(line)) => write!(f, "Invalid record at line {line}. Error: {}", self.message),
            _ => write!(f, "Invalid record: {}", self.message),
        }
    }
}

impl std::error::Error for SourceError {}

/// An item failed transformation or validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Processing failed: {message}")]
pub struct ProcessingError {
    /// What went wrong.
    pub message: String,
}

impl ProcessingError {
    /// Creates a new processing error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The flavour of a resource (sink/storage) failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceErrorKind {
    /// Contention, deadlock, timeout: the same call may succeed later.
    Transient,
    /// The resource is temporarily unavailable.
    ResourceFailure,
    /// A low-level connectivity error from the driver.
    Connectivity,
    /// A generic, non-transient data access failure.
    DataAccess,
    /// A constraint or uniqueness violation.
    IntegrityViolation,
}

impl fmt::Display for ResourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ResourceFailure => write!(f, "resource failure"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::DataAccess => write!(f, "data access"),
            Self::IntegrityViolation => write!(f, "integrity violation"),
        }
    }
}

/// A failure raised by a sink or other persistent resource.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ResourceError {
    /// The flavour of the failure.
    pub kind: ResourceErrorKind,
    /// The error message.
    pub message: String,
    /// The underlying driver error, if any.
    #[source]
    pub cause: Option<Failure>,
}

impl ResourceError {
    /// Creates a new resource error.
    #[must_use]
    pub fn new(kind: ResourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a transient resource error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ResourceErrorKind::Transient, message)
    }

    /// Creates a resource-unavailable error.
    #[must_use]
    pub fn resource_failure(message: impl Into<String>) -> Self {
        Self::new(ResourceErrorKind::ResourceFailure, message)
    }

    /// Creates a connectivity error.
    #[must_use]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(ResourceErrorKind::Connectivity, message)
    }

    /// Creates a generic data access error.
    #[must_use]
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::new(ResourceErrorKind::DataAccess, message)
    }

    /// Creates an integrity violation error.
    #[must_use]
    pub fn integrity_violation(message: impl Into<String>) -> Self {
        Self::new(ResourceErrorKind::IntegrityViolation, message)
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<Failure>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ExceptionClassifier;
    use std::error::Error as _;

    #[test]
    fn test_source_error_display_with_line() {
        let err = SourceError::invalid_record("price is not a number", "7,Widget,,abc", 8);
        assert_eq!(
            err.to_string(),
            "Invalid record at line 8: 7,Widget,,abc. Error: price is not a number"
        );
    }

    #[test]
    fn test_source_error_display_without_line() {
        let err = SourceError::new("unterminated quote");
        assert_eq!(err.to_string(), "Invalid record: unterminated quote");
    }

    #[test]
    fn test_resource_error_constructors() {
        assert_eq!(ResourceError::transient("x").kind, ResourceErrorKind::Transient);
        assert_eq!(ResourceError::connectivity("x").kind, ResourceErrorKind::Connectivity);
        assert_eq!(
            ResourceError::integrity_violation("x").kind,
            ResourceErrorKind::IntegrityViolation
        );
    }

    #[test]
    fn test_resource_error_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timeout");
        let err = ResourceError::connectivity("lost connection").with_cause(io);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "lost connection");
    }

    #[test]
    fn test_step_failure_surfaces_original_error() {
        let classifier = ExceptionClassifier::default();
        let classified = classifier.classify(Box::new(ProcessingError::new("negative price")));
        let failure = StepFailure::new(Phase::Process, Some(3), classified);

        assert_eq!(failure.kind, ErrorKind::Validation);
        assert!(failure.to_string().contains("item #3"));
        assert_eq!(
            failure.downcast_ref::<ProcessingError>(),
            Some(&ProcessingError::new("negative price"))
        );
        assert_eq!(
            failure.source().map(ToString::to_string),
            Some("Processing failed: negative price".to_string())
        );
    }

    #[test]
    fn test_batch_error_step_failed_chain() {
        let classifier = ExceptionClassifier::default();
        let classified = classifier.classify(Box::new(ResourceError::data_access("boom")));
        let err = BatchError::StepFailed {
            step: "load".to_string(),
            source: StepFailure::new(Phase::Write, None, classified),
        };

        assert!(err.to_string().starts_with("Step 'load' failed"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_job_failure_converts_to_step_failed() {
        let classifier = ExceptionClassifier::default();
        let classified = classifier.classify(Box::new(SourceError::new("bad header")));
        let failure = JobFailure::new("extract", StepFailure::new(Phase::Read, Some(1), classified));

        let err = BatchError::from(failure);
        match err {
            BatchError::StepFailed { step, source } => {
                assert_eq!(step, "extract");
                assert_eq!(source.kind, ErrorKind::Parse);
                assert!(source.downcast_ref::<SourceError>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
