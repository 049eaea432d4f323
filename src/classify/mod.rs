//! Error classification
//!
//! Raw provider failures are mapped onto one closed taxonomy, [`ErrorKind`],
//! which is what the retry driver and the run orchestrator act on. Each
//! provider surface has its own classifier ([`fitness`], [`storage`]) but both
//! follow the same shape:
//!
//! 1. inspect the structured code the provider supplied, if any
//! 2. otherwise walk an ordered table of [`MessageRule`]s against the
//!    lowercased message; the first matching rule wins
//! 3. otherwise fall back to an optimistic, retryable kind

pub mod fitness;
pub mod storage;

use std::fmt;

pub use fitness::{classify_fitness_error, FitnessCall};
pub use storage::classify_storage_error;

/// Closed taxonomy of classified failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credentials rejected or missing
    Authentication,
    /// Connection, DNS, socket or timeout failure
    NetworkTransport,
    /// Provider reported a temporary outage
    ServiceUnavailable,
    /// Provider asked us to slow down
    Throttled,
    /// Object too large, bucket full and similar
    StorageCapacity,
    /// Request rejected as invalid
    ApiRequestError,
    /// Anything we could not recognize
    TransientUnknown,
}

impl ErrorKind {
    /// Whether the failure may succeed on a later attempt.
    ///
    /// Authentication, storage-capacity and invalid-request failures need a
    /// human to fix something before they can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::Authentication | ErrorKind::StorageCapacity | ErrorKind::ApiRequestError
        )
    }

    /// Short user-facing description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication error",
            Self::NetworkTransport => "network error",
            Self::ServiceUnavailable => "service error",
            Self::Throttled => "throttling error",
            Self::StorageCapacity => "storage error",
            Self::ApiRequestError => "API error",
            Self::TransientUnknown => "temporary error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Which provider surface produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Fitness data provider
    Fitness,
    /// Object storage backend
    Storage,
}

impl Subsystem {
    fn label(&self) -> &'static str {
        match self {
            Subsystem::Fitness => "Garmin",
            Subsystem::Storage => "R2",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A failure tagged with its retry-determining kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{subsystem} {kind}{}: {message}", code_suffix(.code))]
pub struct ClassifiedError {
    /// Surface that failed
    pub subsystem: Subsystem,
    /// Classified kind
    pub kind: ErrorKind,
    /// Original provider message
    pub message: String,
    /// Provider error code (storage backend only)
    pub code: Option<String>,
}

impl ClassifiedError {
    /// Create a classified error without a provider code
    pub fn new(subsystem: Subsystem, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            subsystem,
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Attach the provider error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether the retry driver may try again
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Predicate half of a classification rule
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Lowercased message contains any of the needles
    AnyOf(&'static [&'static str]),
    /// Message carries an HTTP 5xx status token (three digits, 500-599)
    ServerStatus,
}

impl Matcher {
    fn matches(&self, lowered: &str) -> bool {
        match self {
            Matcher::AnyOf(needles) => needles.iter().any(|n| lowered.contains(n)),
            Matcher::ServerStatus => mentions_server_status(lowered),
        }
    }
}

/// One row of an ordered classification table
#[derive(Debug, Clone, Copy)]
pub struct MessageRule {
    /// Predicate evaluated against the lowercased message
    pub matcher: Matcher,
    /// Kind assigned when the predicate holds
    pub kind: ErrorKind,
}

impl MessageRule {
    /// Rule matching any of the given substrings
    pub const fn any_of(needles: &'static [&'static str], kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::AnyOf(needles),
            kind,
        }
    }

    /// Rule matching a 5xx status token
    pub const fn server_status(kind: ErrorKind) -> Self {
        Self {
            matcher: Matcher::ServerStatus,
            kind,
        }
    }
}

/// Evaluate rules top to bottom and return the first matching kind
pub fn first_match(rules: &[MessageRule], message: &str) -> Option<ErrorKind> {
    let lowered = message.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matcher.matches(&lowered))
        .map(|rule| rule.kind)
}

fn mentions_server_status(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 3)
        .filter_map(|token| token.parse::<u16>().ok())
        .any(|code| (500..600).contains(&code))
}
