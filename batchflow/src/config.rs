//! Configuration for chunk-oriented steps.
//!
//! Values come from [`BatchConfig::default`], a JSON document, or a JSON
//! file, and can then be overridden from `BATCH_*` environment variables.
//! Policies are derived from a validated config once, when a step is built.

use crate::errors::BatchError;
use crate::policy::{Backoff, BackoffStrategy, JitterStrategy, RetryPolicy, SkipPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`BatchConfig::chunk_size`].
pub const ENV_CHUNK_SIZE: &str = "BATCH_CHUNK_SIZE";
/// Environment variable overriding [`BatchConfig::skip_limit`].
pub const ENV_SKIP_LIMIT: &str = "BATCH_SKIP_LIMIT";
/// Environment variable overriding [`BatchConfig::retry_limit`].
pub const ENV_RETRY_LIMIT: &str = "BATCH_RETRY_LIMIT";
/// Environment variable overriding [`BatchConfig::retry_backoff_ms`].
pub const ENV_RETRY_BACKOFF_MS: &str = "BATCH_RETRY_BACKOFF_MS";

/// Options for a chunk-oriented step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per chunk (commit interval).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum skipped items per step. Zero disables skipping.
    #[serde(default = "default_skip_limit")]
    pub skip_limit: u64,
    /// Attempt budget for transient resource errors.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Base delay between retry attempts in milliseconds.
    #[serde(default)]
    pub retry_backoff_ms: u64,
    /// Maximum delay between retry attempts in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// How the retry delay grows between attempts.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Randomisation applied to the retry delay.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_chunk_size() -> usize {
    10
}

fn default_skip_limit() -> u64 {
    5
}

fn default_retry_limit() -> u32 {
    3
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            skip_limit: default_skip_limit(),
            retry_limit: default_retry_limit(),
            retry_backoff_ms: 0,
            max_backoff_ms: default_max_backoff_ms(),
            backoff: BackoffStrategy::default(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl BatchConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from a JSON document.
    ///
    /// Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, BatchError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Applies `BATCH_*` environment variable overrides.
    pub fn with_env_overrides(self) -> Result<Self, BatchError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Used by [`BatchConfig::with_env_overrides`]; exposed so callers can
    /// feed values from their own configuration source.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, BatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CHUNK_SIZE) {
            self.chunk_size = parse_override(ENV_CHUNK_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_SKIP_LIMIT) {
            self.skip_limit = parse_override(ENV_SKIP_LIMIT, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_LIMIT) {
            self.retry_limit = parse_override(ENV_RETRY_LIMIT, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_BACKOFF_MS) {
            self.retry_backoff_ms = parse_override(ENV_RETRY_BACKOFF_MS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Sets the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the skip limit.
    #[must_use]
    pub fn with_skip_limit(mut self, skip_limit: u64) -> Self {
        self.skip_limit = skip_limit;
        self
    }

    /// Sets the retry limit.
    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn with_retry_backoff_ms(mut self, delay: u64) -> Self {
        self.retry_backoff_ms = delay;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::InvalidConfig(
                "chunk_size must be a positive integer".to_string(),
            ));
        }
        if self.retry_limit == 0 {
            return Err(BatchError::InvalidConfig(
                "retry_limit must be a positive integer".to_string(),
            ));
        }
        if self.max_backoff_ms < self.retry_backoff_ms {
            return Err(BatchError::InvalidConfig(format!(
                "max_backoff_ms ({}) is smaller than retry_backoff_ms ({})",
                self.max_backoff_ms, self.retry_backoff_ms
            )));
        }
        Ok(())
    }

    /// Builds the backoff described by this configuration.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff)
            .with_base_delay(Duration::from_millis(self.retry_backoff_ms))
            .with_max_delay(Duration::from_millis(self.max_backoff_ms))
            .with_jitter(self.jitter)
    }

    /// Builds the retry policy described by this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_limit).with_backoff(self.backoff())
    }

    /// Builds the skip policy described by this configuration.
    #[must_use]
    pub fn skip_policy(&self) -> SkipPolicy {
        SkipPolicy::new(self.skip_limit)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, BatchError> {
    value
        .trim()
        .parse()
        .map_err(|_| BatchError::InvalidConfig(format!("{key} has invalid value '{value}'")))
}
