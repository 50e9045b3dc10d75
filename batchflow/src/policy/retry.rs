//! Retry policy with per-kind attempt budgets and configurable backoff.

use super::{ErrorCategory, ErrorKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// Computes the pause between two attempts of the same operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    strategy: BackoffStrategy,
    jitter: JitterStrategy,
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffStrategy::default())
    }
}

impl Backoff {
    /// Creates a backoff with a zero base delay.
    #[must_use]
    pub fn new(strategy: BackoffStrategy) -> Self {
        Self {
            strategy,
            jitter: JitterStrategy::None,
            base: Duration::ZERO,
            max: Duration::from_secs(30),
        }
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns true if every computed delay is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.base.is_zero()
    }

    /// Calculates the delay before retry number `retry` (0-indexed).
    ///
    /// `previous` is the last delay used for the same operation and only
    /// matters for decorrelated jitter.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn delay(&self, retry: u32, previous: Option<Duration>) -> Duration {
        let base = self.base.as_millis() as u64;
        let max = self.max.as_millis() as u64;

        let delay = match self.strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = previous.map_or(base, |d| d.as_millis() as u64);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Attempt bookkeeping for one item operation.
///
/// A context is opened when an operation on an item starts and dropped when
/// it succeeds or gives up. It is never shared between items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryContext {
    attempts: u32,
    last_kind: Option<ErrorKind>,
    last_delay: Option<Duration>,
}

impl RetryContext {
    /// Number of failed attempts registered so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Kind of the most recent failure.
    #[must_use]
    pub fn last_kind(&self) -> Option<ErrorKind> {
        self.last_kind
    }

    /// Records a failed attempt.
    pub fn register_failure(&mut self, kind: ErrorKind) {
        self.attempts += 1;
        self.last_kind = Some(kind);
    }
}

/// Decides whether a failed operation is attempted again.
///
/// Every [`ErrorKind`] has an attempt budget. Lookup order is the exact kind,
/// then the kind's [`ErrorCategory`], then the default budget of 1 (no retry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    budgets: HashMap<ErrorKind, u32>,
    category_budgets: HashMap<ErrorCategory, u32>,
    default_budget: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a policy granting `retry_limit` attempts to transient
    /// resource errors and one fewer (at least one) to connectivity errors.
    #[must_use]
    pub fn new(retry_limit: u32) -> Self {
        let retry_limit = retry_limit.max(1);
        let budgets = [
            (ErrorKind::TransientResource, retry_limit),
            (ErrorKind::Connectivity, retry_limit.saturating_sub(1).max(1)),
        ]
        .into_iter()
        .collect();
        Self {
            budgets,
            category_budgets: HashMap::new(),
            default_budget: 1,
            backoff: Backoff::default(),
        }
    }

    /// Sets the budget for one kind.
    #[must_use]
    pub fn with_budget(mut self, kind: ErrorKind, attempts: u32) -> Self {
        self.budgets.insert(kind, attempts.max(1));
        self
    }

    /// Sets the budget for kinds of a category without their own budget.
    #[must_use]
    pub fn with_category_budget(mut self, category: ErrorCategory, attempts: u32) -> Self {
        self.category_budgets.insert(category, attempts.max(1));
        self
    }

    /// Sets the backoff between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the backoff.
    #[must_use]
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Returns the attempt budget for a kind.
    #[must_use]
    pub fn budget_for(&self, kind: ErrorKind) -> u32 {
        self.budgets
            .get(&kind)
            .or_else(|| self.category_budgets.get(&kind.category()))
            .copied()
            .unwrap_or(self.default_budget)
    }

    /// Returns true if another attempt is allowed after `attempts` failures.
    #[must_use]
    pub fn can_retry(&self, kind: ErrorKind, attempts: u32) -> bool {
        attempts < self.budget_for(kind)
    }

    /// Opens a fresh context for an item operation.
    #[must_use]
    pub fn open(&self) -> RetryContext {
        RetryContext::default()
    }

    /// Returns true if the operation tracked by `context` may run again.
    ///
    /// A context with no failures always may.
    #[must_use]
    pub fn can_retry_context(&self, context: &RetryContext) -> bool {
        context
            .last_kind
            .map_or(true, |kind| self.can_retry(kind, context.attempts))
    }

    /// Computes and records the pause before the next attempt.
    pub fn backoff_delay(&self, context: &mut RetryContext) -> Duration {
        let retry = context.attempts.saturating_sub(1);
        let delay = self.backoff.delay(retry, context.last_delay);
        context.last_delay = Some(delay);
        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
