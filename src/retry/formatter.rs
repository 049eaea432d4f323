//! Retry message formatting
//!
//! Keeps retry log lines consistent across the fitness and storage call sites.

use crate::classify::ErrorKind;
use std::time::Duration;

/// Suggested remediation for a failure kind.
pub fn suggestion(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Authentication => "Verify credentials and access permissions",
        ErrorKind::NetworkTransport => "Check network connectivity and DNS resolution",
        ErrorKind::ServiceUnavailable => "The provider may be having an outage, try again later",
        ErrorKind::Throttled => "Reduce request rate or wait before the next run",
        ErrorKind::StorageCapacity => "Check bucket quota and object size limits",
        ErrorKind::ApiRequestError => "Check the requested date range and API parameters",
        ErrorKind::TransientUnknown => "Try again later",
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Retry number (1-based)
    pub attempt: u32,
    /// Maximum number of retries configured
    pub max_retries: u32,
    /// Kind of error that triggered the retry
    pub error_kind: ErrorKind,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Operation being retried (e.g., "upload steps_data.json")
    pub operation: String,
    /// Original error message
    pub error_message: String,
}

impl RetryContext {
    /// Convenience constructor
    pub fn new(
        attempt: u32,
        max_retries: u32,
        error_kind: ErrorKind,
        backoff_duration: Duration,
        operation: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_retries,
            error_kind,
            backoff_duration,
            operation: operation.into(),
            error_message: error_message.into(),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        let mut message = format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt,
            self.max_retries,
            self.error_kind.description(),
            self.backoff_duration.as_secs_f64()
        );
        append_operation(&mut message, &self.operation);
        message
    }

    /// Format message for an attempt that finally worked.
    pub fn format_success(&self) -> String {
        let mut message = format!(
            "Retry attempt {}/{} succeeded",
            self.attempt, self.max_retries
        );
        append_operation(&mut message, &self.operation);
        message
    }

    /// Format final failure summary with a suggestion.
    pub fn format_failure(&self) -> String {
        let operation = if self.operation.is_empty() {
            "operation"
        } else {
            &self.operation
        };
        [
            format!(
                "[FAILED] {} failed after {} attempts",
                operation,
                self.max_retries + 1
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Error kind: {}", self.error_kind),
            format!("  Suggestion: {}", suggestion(self.error_kind)),
        ]
        .join("\n")
    }
}

fn append_operation(buffer: &mut String, operation: &str) {
    if !operation.is_empty() {
        buffer.push_str(" (");
        buffer.push_str(operation);
        buffer.push(')');
    }
}
