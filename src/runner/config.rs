//! Run configuration

use crate::sync::DateOverride;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::fmt;

/// Default zone for "today" and timestamps
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Australia::Sydney;

/// First tracked date when none is configured
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Everything one sync run needs besides its collaborators
#[derive(Clone, PartialEq)]
pub struct RunConfig {
    /// Fitness account email
    pub email: String,
    /// Fitness account password
    pub password: String,
    /// Zone used for "today" and metadata timestamps
    pub timezone: Tz,
    /// First tracked date
    pub start_date: NaiveDate,
    /// Forced refetch range replacing the normal plan
    pub forced_range: Option<DateOverride>,
    /// Public base URL of the bucket, for `config.js`
    pub public_url: Option<String>,
}

impl RunConfig {
    /// Config with default zone and start date
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            timezone: DEFAULT_TIMEZONE,
            start_date: default_start_date(),
            forced_range: None,
            public_url: None,
        }
    }

    /// Set the zone
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the first tracked date
    pub fn with_start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = start_date;
        self
    }

    /// Force a refetch range
    pub fn with_forced_range(mut self, range: Option<DateOverride>) -> Self {
        self.forced_range = range;
        self
    }

    /// Set the public bucket URL
    pub fn with_public_url(mut self, public_url: Option<String>) -> Self {
        self.public_url = public_url;
        self
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("timezone", &self.timezone)
            .field("start_date", &self.start_date)
            .field("forced_range", &self.forced_range)
            .field("public_url", &self.public_url)
            .finish()
    }
}
