//! # Step Tracker Sync Library
//!
//! Keeps a published daily step/distance dataset in sync with a fitness provider.
//! One invocation downloads the current dataset from object storage, works out
//! which dates need a fresh fetch, fetches them, merges the results and
//! republishes the dataset together with a small `config.js` file.
//!
//! ## Architecture
//!
//! - [`retry`] - Generic exponential-backoff retry driver
//! - [`classify`] - Error taxonomies deciding what is retryable
//! - [`fetcher`] - Authenticated fitness provider client
//! - [`storage`] - Object storage gateway (download, upload, publish)
//! - [`sync`] - Date reconciliation plan and record merge
//! - [`runner`] - Run orchestration
//! - [`health`] - Healthcheck reporting
//! - [`cli`] - Command line / environment configuration
//!
//! ## Data Types
//!
//! - [`DailyRecord`] - One calendar date's steps and kilometres
//! - [`Dataset`] - The published document: metadata plus date-keyed records
//! - [`DailyStepEntry`] - One row as returned by the fitness provider

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Command line and environment configuration
pub mod cli;

/// Error classification for provider failures
pub mod classify;

/// Ingestion of stored datasets (current and legacy shapes)
pub mod dataset;

/// Fitness provider client
pub mod fetcher;

/// Healthcheck reporting
pub mod health;

/// Retry with exponential backoff
pub mod retry;

/// Run orchestration
pub mod runner;

/// Object storage gateway
pub mod storage;

/// Reconciliation and merge engine
pub mod sync;

pub use classify::{ClassifiedError, ErrorKind, Subsystem};
pub use runner::{RunOutcome, RunReport, SyncRunner};

/// Object key of the published dataset
pub const DATA_OBJECT_KEY: &str = "steps_data.json";

/// Object key of the generated browser configuration script
pub const CONFIG_OBJECT_KEY: &str = "config.js";

/// One calendar date's observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DailyRecord {
    /// Total steps for the day
    pub steps: u64,
    /// Distance in kilometres, rounded to 2 decimals
    pub km: f64,
}

impl DailyRecord {
    /// Build a record from provider values.
    ///
    /// Missing or negative steps become 0; distance is converted from metres to
    /// kilometres and rounded to 2 decimals (0 when missing).
    pub fn from_provider(total_steps: Option<i64>, distance_meters: Option<f64>) -> Self {
        let steps = total_steps.unwrap_or(0).max(0) as u64;
        let km = distance_meters
            .filter(|m| m.is_finite() && *m > 0.0)
            .map(|m| round_km(m / 1000.0))
            .unwrap_or(0.0);
        Self { steps, km }
    }

    /// Validate record integrity
    pub fn validate(&self) -> Result<(), String> {
        if !self.km.is_finite() {
            return Err(format!("Distance must be finite, got {}", self.km));
        }
        if self.km < 0.0 {
            return Err(format!("Distance must be non-negative, got {}", self.km));
        }
        Ok(())
    }
}

/// Round a kilometre value to 2 decimal places
pub fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

/// Dataset metadata block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    /// When the dataset was last published (with UTC offset)
    pub last_updated: DateTime<FixedOffset>,
    /// IANA zone the dates are expressed in
    pub timezone: String,
    /// When the most recent degraded run happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<FixedOffset>>,
    /// Why the most recent degraded run happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// The persisted document published as `steps_data.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    /// Publication metadata
    pub metadata: DatasetMetadata,
    /// Records keyed by calendar date
    pub data: BTreeMap<NaiveDate, DailyRecord>,
}

impl Dataset {
    /// Pretty-printed JSON body as uploaded
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// One daily row returned by the fitness provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyStepEntry {
    /// Calendar date of the row
    #[serde(rename = "calendarDate")]
    pub calendar_date: NaiveDate,
    /// Total steps, absent when the device has not synced
    #[serde(rename = "totalSteps", default)]
    pub total_steps: Option<i64>,
    /// Total distance in metres
    #[serde(rename = "totalDistance", alias = "totalDistanceMeters", default)]
    pub distance_meters: Option<f64>,
}

impl DailyStepEntry {
    /// Normalized record for this row
    pub fn to_record(&self) -> DailyRecord {
        DailyRecord::from_provider(self.total_steps, self.distance_meters)
    }
}
