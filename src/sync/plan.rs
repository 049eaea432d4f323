//! Date reconciliation plan
//!
//! Decides which dates need a fresh fetch:
//!
//! 1. every date in `[start, today]` missing from the dataset (`missing-data`)
//! 2. today, always (`ensure-current-data`)
//! 3. the two previous days, always (`catch-updates`)
//!
//! A forced override range replaces all three rules. The provider only accepts
//! contiguous ranges, so the plan is turned into a single [`FetchWindow`]
//! spanning its earliest and latest dates.

use crate::DailyRecord;
use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;

/// Number of days before today that are always refreshed
pub const RECENT_REFRESH_DAYS: u64 = 2;

/// Why a date is in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// No record for the date
    MissingData,
    /// The date is today
    EnsureCurrentData,
    /// Recent day, refreshed to pick up late corrections
    CatchUpdates,
    /// Requested by a forced date range
    ForcedOverride,
}

impl Reason {
    /// Stable label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::MissingData => "missing-data",
            Reason::EnsureCurrentData => "ensure-current-data",
            Reason::CatchUpdates => "catch-updates",
            Reason::ForcedOverride => "forced-override",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid forced date range
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("date range start {start} is after end {end}")]
pub struct ReversedRange {
    /// Requested start
    pub start: NaiveDate,
    /// Requested end
    pub end: NaiveDate,
}

/// Inclusive forced date range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOverride {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateOverride {
    /// Create a range; `start` must not be after `end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ReversedRange> {
        if start > end {
            return Err(ReversedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// First date
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last date
    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

/// Contiguous date range handed to the fitness provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// First date (inclusive)
    pub start: NaiveDate,
    /// Last date (inclusive)
    pub end: NaiveDate,
}

/// Sorted dates to fetch, each with the first reason that selected it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    entries: BTreeMap<NaiveDate, Reason>,
}

impl ReconciliationPlan {
    fn add(&mut self, date: NaiveDate, reason: Reason) {
        self.entries.entry(date).or_insert(reason);
    }

    /// `(date, reason)` pairs in date order
    pub fn entries(&self) -> impl Iterator<Item = (NaiveDate, Reason)> + '_ {
        self.entries.iter().map(|(date, reason)| (*date, *reason))
    }

    /// Dates in order
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.entries.keys().copied().collect()
    }

    /// Reason for one date
    pub fn reason_for(&self, date: NaiveDate) -> Option<Reason> {
        self.entries.get(&date).copied()
    }

    /// Number of dates selected for `reason`
    pub fn count(&self, reason: Reason) -> usize {
        self.entries.values().filter(|r| **r == reason).count()
    }

    /// Number of planned dates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is planned
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `[min(dates), max(dates)]`, `None` for an empty plan
    pub fn fetch_window(&self) -> Option<FetchWindow> {
        let start = *self.entries.keys().next()?;
        let end = *self.entries.keys().next_back()?;
        Some(FetchWindow { start, end })
    }
}

/// Build the plan for one run.
///
/// Catch-up days before `start` are left out; a `start` after `today` yields
/// no missing dates.
pub fn build_plan(
    existing: &BTreeMap<NaiveDate, DailyRecord>,
    start: NaiveDate,
    today: NaiveDate,
    forced: Option<DateOverride>,
) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    if let Some(range) = forced {
        for date in range.start.iter_days().take_while(|d| *d <= range.end) {
            plan.add(date, Reason::ForcedOverride);
        }
        return plan;
    }

    for date in start.iter_days().take_while(|d| *d <= today) {
        if !existing.contains_key(&date) {
            plan.add(date, Reason::MissingData);
        }
    }

    plan.add(today, Reason::EnsureCurrentData);

    for back in 1..=RECENT_REFRESH_DAYS {
        if let Some(date) = today.checked_sub_days(Days::new(back)) {
            if date >= start {
                plan.add(date, Reason::CatchUpdates);
            }
        }
    }

    plan
}
