//! Record merge
//!
//! Folds fetched provider rows into the dataset and classifies each one as
//! new, updated or unchanged. Unchanged records are left bit-identical.

use crate::{DailyRecord, DailyStepEntry};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Step count below which a recent day is flagged as possibly incomplete
pub const LOW_CONFIDENCE_STEPS: u64 = 5000;

/// How many days back from today the low-confidence check applies
pub const LOW_CONFIDENCE_WINDOW_DAYS: i64 = 3;

/// How a fetched record relates to what was stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change {
    /// No stored record
    New,
    /// Stored record differs
    Updated {
        /// The replaced record
        previous: DailyRecord,
    },
    /// Stored record is identical
    Unchanged,
}

/// Classify a fetched record against the stored one
pub fn classify_change(existing: Option<&DailyRecord>, fetched: &DailyRecord) -> Change {
    match existing {
        None => Change::New,
        Some(previous) if previous == fetched => Change::Unchanged,
        Some(previous) => Change::Updated {
            previous: *previous,
        },
    }
}

/// Counts produced by one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records added
    pub new: usize,
    /// Records replaced
    pub updated: usize,
    /// Records already correct
    pub unchanged: usize,
    /// Recent dates with suspiciously low step counts
    pub low_confidence: Vec<NaiveDate>,
}

impl MergeSummary {
    /// New plus updated records
    pub fn changed(&self) -> usize {
        self.new + self.updated
    }

    /// Whether any record was added or replaced
    pub fn has_changes(&self) -> bool {
        self.changed() > 0
    }
}

/// Whether `date` is recent enough for the low-confidence check
fn is_recent(date: NaiveDate, today: NaiveDate) -> bool {
    let days_ago = (today - date).num_days();
    (0..=LOW_CONFIDENCE_WINDOW_DAYS).contains(&days_ago)
}

/// Merge `entries` into `data`
pub fn merge_entries(
    data: &mut BTreeMap<NaiveDate, DailyRecord>,
    entries: &[DailyStepEntry],
    today: NaiveDate,
) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for entry in entries {
        let date = entry.calendar_date;
        let record = entry.to_record();

        if record.steps < LOW_CONFIDENCE_STEPS && is_recent(date, today) {
            warn!(
                %date,
                steps = record.steps,
                "Low step count for a recent day, provider data may still be syncing"
            );
            summary.low_confidence.push(date);
        }

        match classify_change(data.get(&date), &record) {
            Change::New => {
                info!(%date, steps = record.steps, km = record.km, "New day");
                summary.new += 1;
                data.insert(date, record);
            }
            Change::Updated { previous } => {
                info!(
                    %date,
                    old_steps = previous.steps,
                    new_steps = record.steps,
                    step_change = record.steps as i64 - previous.steps as i64,
                    km_change = crate::round_km(record.km - previous.km),
                    "Updated day"
                );
                summary.updated += 1;
                data.insert(date, record);
            }
            Change::Unchanged => {
                debug!(%date, "Unchanged");
                summary.unchanged += 1;
            }
        }
    }

    info!(
        new = summary.new,
        updated = summary.updated,
        unchanged = summary.unchanged,
        "Merge complete"
    );
    summary
}
