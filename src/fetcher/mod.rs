//! Fitness provider client
//!
//! [`FitnessProvider`] is the raw transport seam (one HTTP implementation in
//! [`garmin`], in-memory fakes in tests). [`FitnessClient`] wraps it with error
//! classification and the retry driver, so callers only ever see
//! [`ClassifiedError`]s.

use crate::classify::{classify_fitness_error, ClassifiedError, ErrorKind, FitnessCall};
use crate::retry::config::{
    FETCH_BASE_DELAY, FETCH_MAX_RETRIES, LOGIN_BASE_DELAY, LOGIN_MAX_RETRIES,
};
use crate::retry::{retry_with_backoff, RetryObserver, RetryPolicy};
use crate::DailyStepEntry;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub mod garmin;
pub mod parser;

/// Kinds retried for both login and fetch calls
const FITNESS_RETRYABLE: &[ErrorKind] = &[ErrorKind::NetworkTransport, ErrorKind::TransientUnknown];

/// Raw fitness transport failure, before classification
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP status when the provider answered
    pub status: Option<u16>,
    /// Error message
    pub message: String,
}

impl ProviderError {
    /// Failure that never produced an HTTP response
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Failure with an HTTP status
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    fn classify(&self, call: FitnessCall) -> ClassifiedError {
        classify_fitness_error(self.status, &self.message, call)
    }
}

/// Authenticated provider session
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
}

impl Session {
    /// Wrap an access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// Bearer token for API calls
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("access_token", &"<redacted>").finish()
    }
}

/// Raw fitness provider transport
#[async_trait]
pub trait FitnessProvider: Send + Sync {
    /// Exchange credentials for a session
    async fn login(&self, email: &str, password: &str) -> Result<Session, ProviderError>;

    /// Daily step rows for the inclusive date range
    async fn fetch_daily_steps(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStepEntry>, ProviderError>;
}

/// Fitness client with classification and retries
pub struct FitnessClient {
    provider: Arc<dyn FitnessProvider>,
    login_policy: RetryPolicy,
    fetch_policy: RetryPolicy,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl FitnessClient {
    /// Create a client with the default login (3 retries, 2 s base) and
    /// fetch (5 retries, 1 s base) policies
    pub fn new(provider: Arc<dyn FitnessProvider>) -> Self {
        Self {
            provider,
            login_policy: RetryPolicy::new(LOGIN_MAX_RETRIES, LOGIN_BASE_DELAY)
                .with_retryable(FITNESS_RETRYABLE),
            fetch_policy: RetryPolicy::new(FETCH_MAX_RETRIES, FETCH_BASE_DELAY)
                .with_retryable(FITNESS_RETRYABLE),
            observer: None,
        }
    }

    /// Override the login retry count
    pub fn with_login_retries(mut self, max_retries: u32) -> Self {
        self.login_policy.max_retries = max_retries;
        self
    }

    /// Override the fetch retry count
    pub fn with_fetch_retries(mut self, max_retries: u32) -> Self {
        self.fetch_policy.max_retries = max_retries;
        self
    }

    /// Receive a signal before every retry
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Log in, retrying transient failures.
    ///
    /// Authentication failures return after a single attempt.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClassifiedError> {
        info!("Authenticating with fitness provider");
        let session = retry_with_backoff(
            &self.login_policy,
            "fitness login",
            self.observer.as_deref(),
            || async move {
                self.provider
                    .login(email, password)
                    .await
                    .map_err(|e| e.classify(FitnessCall::Login))
            },
        )
        .await?;
        info!("Authenticated with fitness provider");
        Ok(session)
    }

    /// Fetch daily statistics for `[start, end]`, retrying transient failures.
    ///
    /// Invalid requests and expired sessions are not retried.
    pub async fn fetch_daily_stats(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStepEntry>, ClassifiedError> {
        info!(%start, %end, "Fetching daily statistics");
        let entries = retry_with_backoff(
            &self.fetch_policy,
            "fetch daily statistics",
            self.observer.as_deref(),
            || async move {
                self.provider
                    .fetch_daily_steps(session, start, end)
                    .await
                    .map_err(|e| e.classify(FitnessCall::Fetch))
            },
        )
        .await?;
        debug!(count = entries.len(), "Fetched daily statistics");
        Ok(entries)
    }
}
