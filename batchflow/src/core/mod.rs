//! Core domain model types for batchflow.
//!
//! This module contains the fundamental types shared by the engine:
//! - Execution status and processing phase enums
//! - Step and job execution statistics

mod stats;
mod status;

pub use stats::{JobExecutionStats, StepExecutionStats};
pub use status::{ExecutionStatus, Phase};
