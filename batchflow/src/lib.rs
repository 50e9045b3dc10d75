//! # Batchflow
//!
//! A chunk-oriented, fault-tolerant batch execution engine.
//!
//! A job is an ordered list of steps. Each step reads items from a source,
//! transforms them, and writes them to a sink in fixed-size chunks, one
//! transaction per chunk. When a chunk fails, the engine rolls it back and
//! reprocesses it one item at a time so that a single bad item cannot block
//! its siblings:
//!
//! - **Classification**: every failure is mapped to an [`policy::ErrorKind`]
//!   by an ordered rule list
//! - **Retry**: transient failures are re-attempted within a per-kind budget,
//!   with optional backoff
//! - **Skip**: input errors and exhausted transient failures are skipped up to
//!   a skip limit; anything else fails the step with the original error
//! - **Statistics**: per-step counters aggregated per job, exposed to
//!   listeners and event sinks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use batchflow::prelude::*;
//!
//! let store = Arc::new(TransactionalStore::new());
//! let load = StepBuilder::new("load")
//!     .config(BatchConfig::default().with_env_overrides()?)
//!     .source(IterSource::from_vec(records))
//!     .transformer(FnTransformer::new(validate))
//!     .transactional_sink(store.clone())
//!     .listener(Arc::new(LoggingStepListener::new()))
//!     .build()?;
//!
//! let mut job = JobBuilder::new("import-products").start(load).build()?;
//! let execution = job.run().await;
//! std::process::exit(execution.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod chunk;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod items;
pub mod job;
pub mod observability;
pub mod policy;
pub mod step;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::BatchConfig;
    pub use crate::core::{ExecutionStatus, JobExecutionStats, Phase, StepExecutionStats};
    pub use crate::errors::{
        BatchError, Failure, JobFailure, ProcessingError, ResourceError, ResourceErrorKind,
        SourceError, StepFailure,
    };
    pub use crate::events::{CollectingEventSink, EventSink, EventType, LoggingEventSink, NoOpEventSink};
    pub use crate::items::{
        FnTransformer, ItemSink, ItemSource, ItemTransformer, IterSource, NoOpTransactionManager,
        PassThroughTransformer, StreamSource, TransactionManager,
    };
    pub use crate::job::{Job, JobBuilder, JobExecution, JobListener};
    pub use crate::observability::{init_tracing, LoggingJobListener, LoggingStepListener};
    pub use crate::policy::{
        BackoffStrategy, ErrorKind, ExceptionClassifier, JitterStrategy, RetryPolicy, SkipPolicy,
    };
    pub use crate::step::{ChunkStep, Step, StepBuilder, StepExecution, StepListener};
    pub use crate::testing::TransactionalStore;
    pub use std::sync::Arc;
}
