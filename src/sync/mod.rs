//! Reconciliation and merge engine
//!
//! [`plan`] decides which dates to fetch; [`merge`] folds fetched rows back
//! into the dataset.

pub mod merge;
pub mod plan;

pub use merge::{merge_entries, Change, MergeSummary};
pub use plan::{build_plan, DateOverride, FetchWindow, Reason, ReconciliationPlan};
