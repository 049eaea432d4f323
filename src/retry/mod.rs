//! Retry with exponential backoff
//!
//! [`retry_with_backoff`] runs a fallible async operation up to
//! `max_retries + 1` times. Whether a failure is retried is decided by the
//! [`RetryPolicy`]'s set of retryable [`ErrorKind`]s, never by the error type:
//! every operation reports failures as a [`ClassifiedError`].
//!
//! # Example
//!
//! ```no_run
//! use step_tracker_sync::retry::{retry_with_backoff, RetryPolicy};
//! use step_tracker_sync::ErrorKind;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), step_tracker_sync::ClassifiedError> {
//! let policy = RetryPolicy::new(3, Duration::from_secs(1))
//!     .with_retryable(&[ErrorKind::NetworkTransport]);
//! let value = retry_with_backoff(&policy, "ping", None, || async { Ok(42) }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Semantics
//!
//! - A non-retryable kind propagates after a single attempt
//! - After the last attempt the last error propagates unchanged
//! - Delay before retry `n` (1-based) is `min(base * factor^(n-1), max)`

pub mod config;
pub mod formatter;

use crate::classify::{ClassifiedError, ErrorKind};
use async_trait::async_trait;
use config::{calculate_backoff, DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_DELAY};
use formatter::RetryContext;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry policy for one call site
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Kinds that may be retried
    pub retryable_kinds: Vec<ErrorKind>,
}

impl RetryPolicy {
    /// Policy with default factor and ceiling that retries nothing until
    /// kinds are added with [`RetryPolicy::with_retryable`].
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retryable_kinds: Vec::new(),
        }
    }

    /// Set the retryable kinds
    pub fn with_retryable(mut self, kinds: &[ErrorKind]) -> Self {
        self.retryable_kinds = kinds.to_vec();
        self
    }

    /// Set the delay ceiling
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Whether this policy retries `kind`
    pub fn retries(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }

    /// Delay before retry number `attempt + 1`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(self.base_delay, self.backoff_factor, self.max_delay, attempt)
    }
}

/// A retry that is about to happen
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice {
    /// Retry number (1-based)
    pub retry: u32,
    /// Configured maximum retries
    pub max_retries: u32,
    /// Delay before the retry
    pub delay: Duration,
    /// Kind of the failure being retried
    pub kind: ErrorKind,
    /// Message of the failure being retried
    pub message: String,
}

/// Receives progress signals while an operation is being retried
#[async_trait]
pub trait RetryObserver: Send + Sync {
    /// Called before sleeping ahead of each retry
    async fn on_retry(&self, notice: &RetryNotice);
}

/// Run `operation` with exponential backoff.
///
/// `label` names the operation in log messages. `observer` (if any) is told
/// about every retry before the backoff sleep.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    observer: Option<&dyn RetryObserver>,
    mut operation: F,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifiedError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        "{}",
                        RetryContext::new(
                            attempt,
                            policy.max_retries,
                            ErrorKind::TransientUnknown,
                            Duration::ZERO,
                            label,
                            "",
                        )
                        .format_success()
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !policy.retries(err.kind) {
            debug!(
                operation = label,
                kind = %err.kind,
                "Failure is not retryable, giving up immediately"
            );
            return Err(err);
        }

        if attempt >= policy.max_retries {
            warn!(
                "{}",
                RetryContext::new(
                    attempt,
                    policy.max_retries,
                    err.kind,
                    Duration::ZERO,
                    label,
                    err.message.clone(),
                )
                .format_failure()
            );
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        attempt += 1;

        warn!(
            error = %err,
            "{}",
            RetryContext::new(
                attempt,
                policy.max_retries,
                err.kind,
                delay,
                label,
                err.message.clone(),
            )
            .format_retry()
        );

        if let Some(observer) = observer {
            let notice = RetryNotice {
                retry: attempt,
                max_retries: policy.max_retries,
                delay,
                kind: err.kind,
                message: err.message.clone(),
            };
            observer.on_retry(&notice).await;
        }

        tokio::time::sleep(delay).await;
    }
}
