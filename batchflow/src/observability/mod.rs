//! Logging setup and summary listeners.
//!
//! The engine itself logs through `tracing` spans and events. This module
//! adds the process-level subscriber setup and two listeners that turn the
//! final statistics into readable summaries.

mod listeners;
mod subscriber;

pub use listeners::{
    throughput, LoggingJobListener, LoggingStepListener, Recommendation,
};
pub use subscriber::init_tracing;
