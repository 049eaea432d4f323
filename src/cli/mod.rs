//! Command line and environment configuration
//!
//! Every option can also be supplied through the environment variable named
//! in its `env` attribute; `main` loads an optional `.env` file first.

pub mod error;

pub use error::CliError;

use crate::fetcher::garmin::{GarminConfig, DEFAULT_API_URL, DEFAULT_AUTH_URL};
use crate::runner::config::DEFAULT_TIMEZONE;
use crate::runner::RunConfig;
use crate::storage::StorageSettings;
use crate::sync::DateOverride;
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for any configured retry count
const MAX_RETRY_COUNT: u32 = 20;

/// Parse an IANA zone name
pub fn parse_timezone(s: &str) -> Result<Tz, CliError> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| CliError::InvalidArgument(format!("unknown timezone '{s}'")))
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("invalid date '{s}': {e}")))
}

/// Parse a `YYYY-MM-DD:YYYY-MM-DD` forced range
pub fn parse_date_range(s: &str) -> Result<DateOverride, CliError> {
    let (start, end) = s.split_once(':').ok_or_else(|| {
        CliError::InvalidArgument(format!(
            "invalid date range '{s}', expected YYYY-MM-DD:YYYY-MM-DD"
        ))
    })?;

    DateOverride::new(parse_date(start)?, parse_date(end)?)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Step tracker sync
#[derive(Debug, Parser)]
#[command(name = "step-tracker-sync")]
#[command(about = "Sync daily step counts from Garmin Connect to object storage", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Garmin account email
    #[arg(long, env = "GARMIN_EMAIL")]
    pub garmin_email: Option<String>,

    /// Garmin account password
    #[arg(long, env = "GARMIN_PASSWORD", hide_env_values = true)]
    pub garmin_password: Option<String>,

    /// Garmin Connect API base URL
    #[arg(long, env = "GARMIN_API_URL", default_value = DEFAULT_API_URL)]
    pub garmin_api_url: String,

    /// Garmin token endpoint
    #[arg(long, env = "GARMIN_AUTH_URL", default_value = DEFAULT_AUTH_URL)]
    pub garmin_auth_url: String,

    /// Login retries (0-20)
    #[arg(long, env = "GARMIN_LOGIN_RETRY_COUNT", default_value = "3",
          value_parser = clap::value_parser!(u32).range(0..=MAX_RETRY_COUNT as i64))]
    pub garmin_login_retry_count: u32,

    /// Fetch retries (0-20)
    #[arg(long, env = "GARMIN_FETCH_RETRY_COUNT", default_value = "5",
          value_parser = clap::value_parser!(u32).range(0..=MAX_RETRY_COUNT as i64))]
    pub garmin_fetch_retry_count: u32,

    /// Garmin request timeout in seconds
    #[arg(long, env = "GARMIN_TIMEOUT", default_value = "30",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub garmin_timeout: u64,

    /// IANA zone used for "today" and timestamps
    #[arg(long, env = "TIMEZONE", default_value = DEFAULT_TIMEZONE.name(), value_parser = parse_timezone)]
    pub timezone: Tz,

    /// First tracked date (YYYY-MM-DD)
    #[arg(long, env = "START_DATE", default_value = "2026-01-01", value_parser = parse_date)]
    pub start_date: NaiveDate,

    /// Refetch exactly this range instead of the normal plan (YYYY-MM-DD:YYYY-MM-DD)
    #[arg(long, env = "FORCE_DATE_RANGE", value_parser = parse_date_range)]
    pub force_date_range: Option<DateOverride>,

    /// S3-compatible endpoint URL
    #[arg(long, env = "R2_ENDPOINT_URL")]
    pub r2_endpoint_url: Option<String>,

    /// Storage access key id
    #[arg(long, env = "R2_ACCESS_KEY_ID")]
    pub r2_access_key_id: Option<String>,

    /// Storage secret access key
    #[arg(long, env = "R2_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub r2_secret_access_key: Option<String>,

    /// Bucket name
    #[arg(long, env = "R2_BUCKET_NAME")]
    pub r2_bucket_name: Option<String>,

    /// Public base URL of the bucket
    #[arg(long, env = "R2_PUBLIC_URL")]
    pub r2_public_url: Option<String>,

    /// Upload retries (0-20)
    #[arg(long, env = "R2_UPLOAD_RETRY_COUNT", default_value = "3",
          value_parser = clap::value_parser!(u32).range(0..=MAX_RETRY_COUNT as i64))]
    pub r2_upload_retry_count: u32,

    /// Storage connect/read timeout in seconds
    #[arg(long, env = "R2_UPLOAD_TIMEOUT", default_value = "30",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub r2_upload_timeout: u64,

    /// Healthcheck base URL
    #[arg(long, env = "HEALTHCHECKS_URL")]
    pub healthchecks_url: Option<String>,

    /// Also write published files to this directory
    #[arg(long, env = "LOCAL_OUTPUT_DIR")]
    pub local_output_dir: Option<PathBuf>,
}

impl Cli {
    /// Run configuration; fails when credentials are missing
    pub fn run_config(&self) -> Result<RunConfig, CliError> {
        let (Some(email), Some(password)) = (
            non_blank(&self.garmin_email),
            non_blank(&self.garmin_password),
        ) else {
            return Err(CliError::ConfigurationError(
                "credentials missing, set GARMIN_EMAIL and GARMIN_PASSWORD".to_string(),
            ));
        };

        Ok(RunConfig::new(email, password)
            .with_timezone(self.timezone)
            .with_start_date(self.start_date)
            .with_forced_range(self.force_date_range)
            .with_public_url(non_blank(&self.r2_public_url)))
    }

    /// Garmin transport settings
    pub fn garmin_config(&self) -> GarminConfig {
        GarminConfig {
            api_url: self.garmin_api_url.clone(),
            auth_url: self.garmin_auth_url.clone(),
            timeout: Duration::from_secs(self.garmin_timeout),
        }
    }

    /// Storage settings (possibly incomplete)
    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            endpoint_url: non_blank(&self.r2_endpoint_url),
            access_key_id: non_blank(&self.r2_access_key_id),
            secret_access_key: non_blank(&self.r2_secret_access_key),
            bucket: non_blank(&self.r2_bucket_name),
            public_url: non_blank(&self.r2_public_url),
            timeout: Duration::from_secs(self.r2_upload_timeout),
        }
    }
}
