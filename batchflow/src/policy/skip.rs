//! Skip policy.

use super::{ClassifiedFailure, ErrorCategory, ErrorKind};
use crate::errors::BatchError;
use regex::RegexSet;
use std::collections::HashSet;

const DEFAULT_CONFLICT_PATTERNS: [&str; 2] = ["constraint violation", "duplicate key"];

/// Decides whether a failed item may be skipped.
///
/// Rules, in order:
///
/// 1. Once `skip_count` has reached the skip limit, nothing is skipped.
/// 2. Skippable kinds (parse and validation by default) are skipped.
/// 3. Resource failures whose message matches a conflict pattern are skipped.
/// 4. Transient failures are skipped only after their retry budget is spent.
/// 5. Everything else is fatal.
///
/// Conflict detection in rule 3 is a case-sensitive text match on the error
/// message. It only works for drivers whose messages contain the configured
/// phrases; use `(?i)` in a custom pattern to relax case.
#[derive(Debug, Clone)]
pub struct SkipPolicy {
    skip_limit: u64,
    skippable: HashSet<ErrorKind>,
    patterns: Vec<String>,
    conflicts: RegexSet,
}

impl SkipPolicy {
    /// Creates a skip policy with the default rules.
    #[must_use]
    pub fn new(skip_limit: u64) -> Self {
        let patterns: Vec<String> = DEFAULT_CONFLICT_PATTERNS
            .iter()
            .map(|p| regex::escape(p))
            .collect();
        Self {
            skip_limit,
            skippable: [ErrorKind::Parse, ErrorKind::Validation].into_iter().collect(),
            conflicts: build_set(&patterns).unwrap_or_else(|_| RegexSet::empty()),
            patterns,
        }
    }

    /// Adds a kind that is always skippable.
    #[must_use]
    pub fn with_skippable(mut self, kind: ErrorKind) -> Self {
        self.skippable.insert(kind);
        self
    }

    /// Adds a regular expression identifying non-transient data conflicts.
    pub fn with_conflict_pattern(mut self, pattern: &str) -> Result<Self, BatchError> {
        self.patterns.push(pattern.to_string());
        self.conflicts = build_set(&self.patterns).map_err(|e| {
            BatchError::InvalidConfig(format!("invalid conflict pattern '{pattern}': {e}"))
        })?;
        Ok(self)
    }

    /// Returns the skip limit.
    #[must_use]
    pub fn skip_limit(&self) -> u64 {
        self.skip_limit
    }

    /// Returns true if a message describes a data conflict.
    #[must_use]
    pub fn is_conflict(&self, message: &str) -> bool {
        self.conflicts.is_match(message)
    }

    /// Decides whether a classified failure may be skipped.
    #[must_use]
    pub fn should_skip(&self, failure: &ClassifiedFailure, skip_count: u64) -> bool {
        self.decide(
            failure.kind(),
            failure.message(),
            failure.retries_exhausted(),
            skip_count,
        )
    }

    /// Applies the rules to the parts of a classified failure.
    #[must_use]
    pub fn decide(
        &self,
        kind: ErrorKind,
        message: &str,
        retries_exhausted: bool,
        skip_count: u64,
    ) -> bool {
        if skip_count >= self.skip_limit {
            return false;
        }
        if self.skippable.contains(&kind) {
            return true;
        }
        if kind.category() == ErrorCategory::Resource && self.is_conflict(message) {
            return true;
        }
        if kind.is_transient() {
            return retries_exhausted;
        }
        false
    }
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

fn build_set(patterns: &[String]) -> Result<RegexSet, regex::Error> {
    RegexSet::new(patterns)
}
