//! Fault-tolerance policies.
//!
//! - [`ExceptionClassifier`]: ordered rules mapping failures to [`ErrorKind`]s.
//! - [`SkipPolicy`]: whether a failed item may be left out.
//! - [`RetryPolicy`]: whether a failed operation is attempted again.
//!
//! Policies are built once when a step is built and are not mutated while the
//! step runs.

mod classifier;
mod retry;
mod skip;

pub use classifier::{ClassifiedFailure, ClassifierRule, ErrorCategory, ErrorKind, ExceptionClassifier};
pub use retry::{Backoff, BackoffStrategy, JitterStrategy, RetryContext, RetryPolicy};
pub use skip::SkipPolicy;

use crate::config::BatchConfig;

/// The policies consulted by a chunk orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FaultTolerance {
    /// Classifies every failure once.
    pub classifier: ExceptionClassifier,
    /// Decides skips.
    pub skip_policy: SkipPolicy,
    /// Decides retries.
    pub retry_policy: RetryPolicy,
}

impl FaultTolerance {
    /// Creates a bundle from explicit policies.
    #[must_use]
    pub fn new(
        classifier: ExceptionClassifier,
        skip_policy: SkipPolicy,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            classifier,
            skip_policy,
            retry_policy,
        }
    }

    /// Creates the standard policies from a configuration.
    #[must_use]
    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            ExceptionClassifier::default(),
            config.skip_policy(),
            config.retry_policy(),
        )
    }
}
