//! Healthcheck reporting
//!
//! Liveness pings in the healthchecks.io style: `<base>/start` when a run
//! begins, `<base>` on success, `<base>/fail` on failure and `<base>/log` for
//! warnings and retry progress. A ping without a body is a GET; a ping with a
//! body is a POST carrying it. Pings are best effort: failures are logged and
//! never reach the caller.

use crate::retry::{RetryNotice, RetryObserver};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout of a single ping
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiver of liveness signals
#[async_trait]
pub trait HealthSink: Send + Sync {
    /// Send one ping to `<base><suffix>` with an optional body
    async fn signal(&self, suffix: &str, body: Option<String>);

    /// Run started
    async fn start(&self) {
        self.signal("/start", None).await;
    }

    /// Run succeeded
    async fn success(&self, summary: Option<String>) {
        self.signal("", summary).await;
    }

    /// Run failed
    async fn failure(&self, message: Option<&str>) {
        let body = match message {
            Some(message) => format!("Step tracker error: {}", message),
            None => "Step tracker failed".to_string(),
        };
        self.signal("/fail", Some(body)).await;
    }

    /// Run finished in a degraded state
    async fn warning(&self, message: Option<&str>) {
        let body = match message {
            Some(message) => format!("Step tracker warning: {}", message),
            None => "Step tracker warning".to_string(),
        };
        self.signal("/log", Some(body)).await;
    }

    /// A call is being retried
    async fn retry_status(&self, retry: u32, max_retries: u32, message: &str) {
        let body = format!("Step tracker retry {}/{}: {}", retry, max_retries, message);
        self.signal("/log", Some(body)).await;
    }
}

/// HTTP healthcheck reporter
pub struct HealthcheckReporter {
    client: Client,
    base_url: Option<String>,
    skip_notice_logged: AtomicBool,
}

impl HealthcheckReporter {
    /// Create a reporter; `None` or a blank URL disables pinging
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(base_url: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(PING_TIMEOUT).build()?;
        let base_url = base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Ok(Self {
            client,
            base_url,
            skip_notice_logged: AtomicBool::new(false),
        })
    }

    /// Whether pings are sent
    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

#[async_trait]
impl HealthSink for HealthcheckReporter {
    async fn signal(&self, suffix: &str, body: Option<String>) {
        let Some(base) = &self.base_url else {
            if !self.skip_notice_logged.swap(true, Ordering::Relaxed) {
                info!("HEALTHCHECKS_URL not configured, skipping healthcheck pings");
            }
            return;
        };

        let url = format!("{}{}", base, suffix);
        let request = match body {
            Some(body) => self.client.post(&url).body(body),
            None => self.client.get(&url),
        };

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %url, "Healthcheck ping sent");
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "Healthcheck ping rejected");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to send healthcheck ping");
            }
        }
    }
}

/// Forwards retry notices to a [`HealthSink`] as retry-status pings
pub struct HealthRetrySignal {
    sink: Arc<dyn HealthSink>,
}

impl HealthRetrySignal {
    /// Wrap a sink
    pub fn new(sink: Arc<dyn HealthSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl RetryObserver for HealthRetrySignal {
    async fn on_retry(&self, notice: &RetryNotice) {
        self.sink
            .retry_status(notice.retry, notice.max_retries, &notice.message)
            .await;
    }
}
