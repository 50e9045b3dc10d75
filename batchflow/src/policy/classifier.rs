//! Failure classification.
//!
//! An [`ExceptionClassifier`] holds an ordered list of rules, each pairing a
//! predicate over an error with an [`ErrorKind`]. Rules are tested against
//! the failure and then against each error in its `source()` chain; the first
//! rule that matches wins. Failures that match nothing are
//! [`ErrorKind::Unclassified`].

use crate::errors::{Failure, ProcessingError, ResourceError, ResourceErrorKind, SourceError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Classified kind of a failure, used to drive skip and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or unreadable input.
    Parse,
    /// An item failed validation or transformation.
    Validation,
    /// Contention or temporary unavailability of a resource.
    TransientResource,
    /// A low-level connectivity problem.
    Connectivity,
    /// A non-retryable resource failure such as a constraint violation.
    PermanentResource,
    /// Anything no rule recognised.
    Unclassified,
}

impl ErrorKind {
    /// Returns the category this kind belongs to.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::Parse | Self::Validation => ErrorCategory::Input,
            Self::TransientResource | Self::Connectivity | Self::PermanentResource => {
                ErrorCategory::Resource
            }
            Self::Unclassified => ErrorCategory::Unknown,
        }
    }

    /// Returns true if the same operation may succeed when attempted again.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::TransientResource | Self::Connectivity)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Validation => write!(f, "validation"),
            Self::TransientResource => write!(f, "transient_resource"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::PermanentResource => write!(f, "permanent_resource"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Coarse grouping of [`ErrorKind`]s, used as a fallback for policy lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Problems with the input data.
    Input,
    /// Problems with a source, sink or transaction resource.
    Resource,
    /// Unrecognised failures.
    Unknown,
}

type Predicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// A single classification rule.
#[derive(Clone)]
pub struct ClassifierRule {
    name: String,
    kind: ErrorKind,
    predicate: Predicate,
}

impl ClassifierRule {
    /// Creates a rule from a predicate.
    pub fn new<F>(name: impl Into<String>, kind: ErrorKind, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            predicate: Arc::new(predicate),
        }
    }

    /// Creates a rule matching every error of type `E`.
    #[must_use]
    pub fn for_type<E: Error + 'static>(name: impl Into<String>, kind: ErrorKind) -> Self {
        Self::new(name, kind, |err| err.is::<E>())
    }

    /// Creates a rule matching errors of type `E` that satisfy `predicate`.
    pub fn for_type_where<E, F>(name: impl Into<String>, kind: ErrorKind, predicate: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self::new(name, kind, move |err| {
            err.downcast_ref::<E>().is_some_and(&predicate)
        })
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind assigned on a match.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Tests the rule against one error.
    #[must_use]
    pub fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        (self.predicate)(err)
    }
}

impl fmt::Debug for ClassifierRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierRule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Maps failures to [`ErrorKind`]s using an ordered rule list.
#[derive(Debug, Clone)]
pub struct ExceptionClassifier {
    rules: Vec<ClassifierRule>,
}

impl Default for ExceptionClassifier {
    fn default() -> Self {
        Self {
            rules: standard_rules(),
        }
    }
}

impl ExceptionClassifier {
    /// Creates a classifier with the standard rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier with no rules; everything is unclassified.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule after the existing ones.
    #[must_use]
    pub fn with_rule(mut self, rule: ClassifierRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Inserts a rule ahead of the existing ones.
    #[must_use]
    pub fn with_priority_rule(mut self, rule: ClassifierRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    /// Determines the kind of an error without taking ownership.
    #[must_use]
    pub fn kind_of(&self, err: &(dyn Error + 'static)) -> ErrorKind {
        std::iter::successors(Some(err), |&e| e.source())
            .find_map(|e| self.rules.iter().find(|rule| rule.matches(e)))
            .map_or(ErrorKind::Unclassified, ClassifierRule::kind)
    }

    /// Classifies a failure.
    #[must_use]
    pub fn classify(&self, error: Failure) -> ClassifiedFailure {
        let kind = self.kind_of(&*error);
        ClassifiedFailure {
            kind,
            message: error.to_string(),
            retries_exhausted: false,
            error,
        }
    }
}

fn standard_rules() -> Vec<ClassifierRule> {
    vec![
        ClassifierRule::for_type::<SourceError>("source_error", ErrorKind::Parse),
        ClassifierRule::for_type_where::<serde_json::Error, _>("json_input", ErrorKind::Parse, |e| {
            !e.is_io()
        }),
        ClassifierRule::for_type::<ProcessingError>("processing_error", ErrorKind::Validation),
        ClassifierRule::for_type_where::<ResourceError, _>(
            "transient_resource",
            ErrorKind::TransientResource,
            |e| {
                matches!(
                    e.kind,
                    ResourceErrorKind::Transient | ResourceErrorKind::ResourceFailure
                )
            },
        ),
        ClassifierRule::for_type_where::<ResourceError, _>(
            "resource_connectivity",
            ErrorKind::Connectivity,
            |e| e.kind == ResourceErrorKind::Connectivity,
        ),
        ClassifierRule::for_type_where::<ResourceError, _>(
            "permanent_resource",
            ErrorKind::PermanentResource,
            |e| {
                matches!(
                    e.kind,
                    ResourceErrorKind::DataAccess | ResourceErrorKind::IntegrityViolation
                )
            },
        ),
        ClassifierRule::for_type_where::<io::Error, _>("io_connectivity", ErrorKind::Connectivity, |e| {
            matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
            )
        }),
        ClassifierRule::for_type_where::<io::Error, _>("io_invalid_data", ErrorKind::Parse, |e| {
            e.kind() == io::ErrorKind::InvalidData
        }),
    ]
}

/// A failure together with its classification.
///
/// The classification is computed once and shared by the retry and skip
/// decisions for that failure.
#[derive(Debug)]
pub struct ClassifiedFailure {
    kind: ErrorKind,
    message: String,
    retries_exhausted: bool,
    error: Failure,
}

impl ClassifiedFailure {
    /// Returns the classified kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true once the retry policy has given up on this failure.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retries_exhausted
    }

    /// Marks the retry budget for this failure as spent.
    #[must_use]
    pub fn exhausted(mut self) -> Self {
        self.retries_exhausted = true;
        self
    }

    /// Returns the original failure.
    #[must_use]
    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.error
    }

    /// Consumes the classification, returning the original failure.
    #[must_use]
    pub fn into_error(self) -> Failure {
        self.error
    }
}
