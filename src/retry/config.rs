//! Retry configuration constants

use std::time::Duration;

/// Default multiplier applied to the delay after every failed attempt.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default base delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling for a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Login retries. Login is expensive on the provider side and repeated
/// failures risk an account lock, so it gets fewer attempts than fetches.
pub const LOGIN_MAX_RETRIES: u32 = 3;

/// Base delay between login attempts.
pub const LOGIN_BASE_DELAY: Duration = Duration::from_secs(2);

/// Daily statistics fetch retries.
pub const FETCH_MAX_RETRIES: u32 = 5;

/// Base delay between fetch attempts.
pub const FETCH_BASE_DELAY: Duration = Duration::from_secs(1);

/// Storage client construction and upload retries.
pub const STORAGE_MAX_RETRIES: u32 = 3;

/// Ceiling for a single upload backoff delay.
pub const UPLOAD_MAX_DELAY: Duration = Duration::from_secs(30);

/// Calculate the delay before retry number `attempt + 1`.
///
/// `min(base * factor^attempt, max)`, with `attempt` counted from 0.
pub fn calculate_backoff(base: Duration, factor: f64, max: Duration, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let seconds = base.as_secs_f64() * factor.powi(exponent);

    if !seconds.is_finite() || seconds >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(seconds.max(0.0))
}
