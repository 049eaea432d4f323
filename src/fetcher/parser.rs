//! Fitness API response parsing
//!
//! Stateless helpers turning response bodies into typed values. A malformed
//! row is skipped with a warning rather than failing the whole response; a
//! body that is not a JSON array at all is an error.

use crate::fetcher::{ProviderError, Session};
use crate::DailyStepEntry;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Parse a token endpoint response into a [`Session`]
pub fn parse_session(body: &str) -> Result<Session, ProviderError> {
    let token: TokenResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::transport(format!("unexpected token response: {}", e))
    })?;

    if token.access_token.is_empty() {
        return Err(ProviderError::transport(
            "unexpected token response: empty access token",
        ));
    }
    Ok(Session::new(token.access_token))
}

/// Parse a daily steps response body
///
/// # Format
/// `[{"calendarDate": "2026-01-01", "totalSteps": 10000, "totalDistance": 8000}, ...]`
pub fn parse_daily_steps(body: &str) -> Result<Vec<DailyStepEntry>, ProviderError> {
    let rows: Vec<Value> = serde_json::from_str(body).map_err(|e| {
        ProviderError::transport(format!("unexpected daily steps response: {}", e))
    })?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<DailyStepEntry>(row) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(error = %e, "Skipping malformed daily steps row"),
        }
    }
    Ok(entries)
}
