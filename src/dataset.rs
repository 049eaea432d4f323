//! Stored dataset ingestion
//!
//! The remote `steps_data.json` has taken three shapes over time:
//!
//! - current: `{"metadata": {...}, "data": {"2026-01-01": {"steps": 1, "km": 0.5}}}`
//! - mixed: the current document with some bare integer step values left over
//! - legacy flat: `{"2026-01-01": 10000, ...}` with no metadata at all
//!
//! Everything is normalized to [`DailyRecord`] here; no other module sees the
//! legacy representation.

use crate::{DailyRecord, DatasetMetadata};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Dataset ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Body was not valid JSON
    #[error("invalid dataset JSON: {0}")]
    InvalidJson(String),

    /// Body was JSON but not an object
    #[error("dataset must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// A record value as it may appear in storage
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StoredRecord {
    /// Bare step count (distance implicitly 0)
    Legacy(u64),
    /// Current `{steps, km}` form
    Current {
        /// Steps
        steps: u64,
        /// Kilometres
        #[serde(default)]
        km: f64,
    },
}

impl StoredRecord {
    /// Normalize to the current record form
    pub fn normalize(self) -> DailyRecord {
        match self {
            StoredRecord::Legacy(steps) => DailyRecord { steps, km: 0.0 },
            StoredRecord::Current { steps, km } => DailyRecord { steps, km },
        }
    }
}

/// A dataset read back from storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExistingDataset {
    /// Metadata, absent for legacy flat documents
    pub metadata: Option<DatasetMetadata>,
    /// Normalized records
    pub data: BTreeMap<NaiveDate, DailyRecord>,
}

impl ExistingDataset {
    /// Parse a stored dataset body.
    ///
    /// Entries whose key is not an ISO date, whose value is `null`, whose
    /// value has an unrecognized shape, or whose distance is negative are
    /// dropped.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DatasetError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DatasetError::InvalidJson(e.to_string()))?;

        let Value::Object(mut root) = value else {
            return Err(DatasetError::NotAnObject(json_type_name(&value)));
        };

        if root.contains_key("data") && root.contains_key("metadata") {
            let metadata = root.remove("metadata").and_then(|raw| {
                serde_json::from_value::<DatasetMetadata>(raw)
                    .map_err(|e| warn!(error = %e, "Ignoring unreadable dataset metadata"))
                    .ok()
            });
            let data = match root.remove("data") {
                Some(Value::Object(entries)) => normalize_entries(entries),
                Some(other) => {
                    warn!(
                        found = json_type_name(&other),
                        "Dataset data block is not an object, ignoring it"
                    );
                    BTreeMap::new()
                }
                None => BTreeMap::new(),
            };
            return Ok(Self { metadata, data });
        }

        debug!("Reading legacy flat dataset");
        Ok(Self {
            metadata: None,
            data: normalize_entries(root),
        })
    }

    /// Whether any record is present
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn normalize_entries(entries: Map<String, Value>) -> BTreeMap<NaiveDate, DailyRecord> {
    let mut data = BTreeMap::new();

    for (key, value) in entries {
        let Ok(date) = NaiveDate::parse_from_str(&key, "%Y-%m-%d") else {
            warn!(key = %key, "Dropping dataset entry with invalid date key");
            continue;
        };

        if value.is_null() {
            debug!(date = %date, "Dropping null dataset entry");
            continue;
        }

        match serde_json::from_value::<StoredRecord>(value) {
            Ok(record) => {
                let record = record.normalize();
                match record.validate() {
                    Ok(()) => {
                        data.insert(date, record);
                    }
                    Err(e) => warn!(date = %date, error = %e, "Dropping invalid dataset entry"),
                }
            }
            Err(e) => warn!(date = %date, error = %e, "Dropping unreadable dataset entry"),
        }
    }

    data
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
