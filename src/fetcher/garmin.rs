//! HTTP transport for the Garmin Connect API
//!
//! Login exchanges credentials at the token endpoint for a bearer token; daily
//! step statistics come from the user summary service. Failures are reported
//! as [`ProviderError`] with the HTTP status when the server answered, and with
//! a message naming the transport problem ("network timeout", "connection
//! error") when it did not.

use crate::fetcher::parser::{parse_daily_steps, parse_session};
use crate::fetcher::{FitnessProvider, ProviderError, Session};
use crate::DailyStepEntry;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Default API base URL
pub const DEFAULT_API_URL: &str = "https://connectapi.garmin.com";

/// Default token endpoint
pub const DEFAULT_AUTH_URL: &str = "https://sso.garmin.com/sso/token";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DAILY_STEPS_PATH: &str = "/usersummary-service/stats/steps/daily";

/// Longest error body excerpt carried into an error message
const MAX_ERROR_BODY: usize = 200;

/// Garmin transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarminConfig {
    /// API base URL
    pub api_url: String,
    /// Token endpoint URL
    pub auth_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GarminConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// reqwest-backed [`FitnessProvider`]
pub struct GarminHttpProvider {
    client: Client,
    config: GarminConfig,
}

impl GarminHttpProvider {
    /// Build the transport
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(config: GarminConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("step-tracker-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn daily_steps_url(&self, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            DAILY_STEPS_PATH,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        )
    }
}

#[async_trait]
impl FitnessProvider for GarminHttpProvider {
    async fn login(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        debug!(url = %self.config.auth_url, "Requesting access token");
        let response = self
            .client
            .post(&self.config.auth_url)
            .json(&json!({ "username": email, "password": password }))
            .send()
            .await
            .map_err(|e| request_error(&e))?;

        let body = successful_body(response).await?;
        parse_session(&body)
    }

    async fn fetch_daily_steps(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStepEntry>, ProviderError> {
        let url = self.daily_steps_url(start, end);
        debug!(url = %url, "Requesting daily steps");

        let response = self
            .client
            .get(&url)
            .bearer_auth(session.access_token())
            .send()
            .await
            .map_err(|e| request_error(&e))?;

        let body = successful_body(response).await?;
        parse_daily_steps(&body)
    }
}

/// Describe a failure that produced no HTTP response
fn request_error(error: &reqwest::Error) -> ProviderError {
    let message = if error.is_timeout() {
        format!("network timeout: {}", error)
    } else if error.is_connect() {
        format!("connection error: {}", error)
    } else {
        format!("network error: {}", error)
    };
    ProviderError::transport(message)
}

/// Body of a 2xx response, or a status-carrying error
async fn successful_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| request_error(&e))?;

    if status.is_success() {
        return Ok(body);
    }

    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(ProviderError::http(
        status.as_u16(),
        format!("HTTP {}: {}", status, excerpt.trim()),
    ))
}
