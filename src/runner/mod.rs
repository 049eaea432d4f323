//! Run orchestration
//!
//! One [`SyncRunner::run`] performs a complete synchronization:
//!
//! 1. signal start
//! 2. download the existing dataset (absent on any error)
//! 3. log in (fatal on failure)
//! 4. build the reconciliation plan and fetch its window
//! 5. merge, or degrade to the existing data when the fetch yielded nothing
//! 6. publish `steps_data.json` and `config.js` if anything changed
//! 7. signal the terminal state
//!
//! # Outcomes
//!
//! - [`RunOutcome::Success`] - changes published
//! - [`RunOutcome::Unchanged`] - nothing to publish, storage not contacted
//! - [`RunOutcome::Warning`] - degraded run or partial publish
//! - [`RunError`] - hard failure (also signalled as `/fail`)

pub mod config;

pub use config::RunConfig;

use crate::classify::{ClassifiedError, ErrorKind};
use crate::dataset::ExistingDataset;
use crate::fetcher::FitnessClient;
use crate::health::HealthSink;
use crate::storage::{PublishObject, PublishOutcome, PublishReport, StorageGateway};
use crate::sync::{build_plan, merge_entries, MergeSummary, Reason, ReconciliationPlan};
use crate::{DailyStepEntry, Dataset, DatasetMetadata};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Terminal failures of a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Credentials rejected
    #[error("authentication failed: {0}")]
    Authentication(ClassifiedError),

    /// Login kept failing after all retries
    #[error("login failed: {0}")]
    Login(ClassifiedError),

    /// Fetch failed with a non-retryable error
    #[error("fetch failed: {0}")]
    Fetch(ClassifiedError),

    /// Nothing was fetched and there is no existing dataset to fall back to
    #[error("no data to serve: {0}")]
    NoData(String),

    /// Dataset could not be serialized
    #[error("failed to serialize dataset: {0}")]
    Serialize(String),

    /// Publish failed for every object, or for a reason needing a human
    #[error("publish failed: {0}")]
    Publish(String),
}

/// How a completed run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Changes were published
    Success,
    /// Nothing changed, nothing published
    Unchanged,
    /// Completed in a degraded state
    Warning(String),
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Terminal state
    pub outcome: RunOutcome,
    /// Merge counts (all zero for a degraded run)
    pub merge: MergeSummary,
    /// Number of planned dates
    pub planned_dates: usize,
    /// Days in the resulting dataset
    pub total_days: usize,
    /// Whether the zone or document format changed
    pub config_changed: bool,
    /// Publish results, `None` when nothing was published
    pub publish: Option<PublishReport>,
    /// The dataset as it now stands
    pub dataset: Dataset,
}

/// Sequences one synchronization run
pub struct SyncRunner {
    config: RunConfig,
    fitness: FitnessClient,
    storage: StorageGateway,
    health: Arc<dyn HealthSink>,
    fixed_now: Option<DateTime<Utc>>,
}

impl SyncRunner {
    /// Create a runner
    pub fn new(
        config: RunConfig,
        fitness: FitnessClient,
        storage: StorageGateway,
        health: Arc<dyn HealthSink>,
    ) -> Self {
        Self {
            config,
            fitness,
            storage,
            health,
            fixed_now: None,
        }
    }

    /// Use a fixed clock instead of the system time
    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_now = Some(now);
        self
    }

    /// Run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.fixed_now
            .unwrap_or_else(Utc::now)
            .with_timezone(&self.config.timezone)
            .fixed_offset()
    }

    /// Execute one run
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let span = tracing::info_span!(
            "sync_run",
            timezone = %self.config.timezone,
            start_date = %self.config.start_date
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<RunReport, RunError> {
        info!("Starting step sync");
        self.health.start().await;

        let existing = self.storage.download_dataset().await;

        let session = match self.fitness.login(&self.config.email, &self.config.password).await {
            Ok(session) => session,
            Err(e) => {
                self.health.failure(Some(&e.to_string())).await;
                return Err(if e.kind == ErrorKind::Authentication {
                    RunError::Authentication(e)
                } else {
                    RunError::Login(e)
                });
            }
        };

        let now = self.now();
        let today = now.date_naive();
        let existing_data = existing
            .as_ref()
            .map(|dataset| dataset.data.clone())
            .unwrap_or_default();

        let plan = build_plan(
            &existing_data,
            self.config.start_date,
            today,
            self.config.forced_range,
        );
        log_plan(&plan, today);

        let mut fetch_failure = None;
        let entries = match plan.fetch_window() {
            Some(window) => {
                match self
                    .fitness
                    .fetch_daily_stats(&session, window.start, window.end)
                    .await
                {
                    Ok(entries) => entries,
                    Err(e) if e.is_retryable() => {
                        warn!(error = %e, "Fetch retries exhausted, continuing without fresh data");
                        fetch_failure = Some(e);
                        Vec::new()
                    }
                    Err(e) => {
                        self.health.failure(Some(&e.to_string())).await;
                        return Err(RunError::Fetch(e));
                    }
                }
            }
            None => Vec::new(),
        };

        let config_changed = self.config_changed(existing.as_ref());

        if entries.is_empty() {
            let reason = fetch_failure
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no data returned from fitness provider".to_string());
            return self
                .degrade(existing, now, reason, plan.len(), config_changed)
                .await;
        }

        self.merge_and_publish(existing, entries, now, today, plan.len(), config_changed)
            .await
    }

    /// Zone changed, or no metadata to compare against
    fn config_changed(&self, existing: Option<&ExistingDataset>) -> bool {
        match existing.and_then(|dataset| dataset.metadata.as_ref()) {
            Some(metadata) => metadata.timezone != self.config.timezone.name(),
            None => true,
        }
    }

    async fn merge_and_publish(
        &self,
        existing: Option<ExistingDataset>,
        entries: Vec<DailyStepEntry>,
        now: DateTime<FixedOffset>,
        today: NaiveDate,
        planned_dates: usize,
        config_changed: bool,
    ) -> Result<RunReport, RunError> {
        let previous = existing.as_ref().and_then(|d| d.metadata.clone());
        let mut data = existing.map(|d| d.data).unwrap_or_default();
        let merge = merge_entries(&mut data, &entries, today);

        let dataset = Dataset {
            metadata: DatasetMetadata {
                last_updated: monotonic_timestamp(now, previous.as_ref()),
                timezone: self.config.timezone.name().to_string(),
                last_failure: None,
                failure_reason: None,
            },
            data,
        };

        if !merge.has_changes() && !config_changed {
            info!(days = dataset.data.len(), "No changes detected, skipping publish");
            self.health
                .success(Some(format!(
                    "No changes, {} days tracked",
                    dataset.data.len()
                )))
                .await;
            return Ok(RunReport {
                outcome: RunOutcome::Unchanged,
                merge,
                planned_dates,
                total_days: dataset.data.len(),
                config_changed,
                publish: None,
                dataset,
            });
        }

        info!(
            changed = merge.changed(),
            config_changed,
            "Changes detected, publishing dataset"
        );
        let report = self.publish(&dataset, true).await?;
        let summary = format!(
            "Updated {} days ({} new, {} updated), {} days tracked",
            merge.changed(),
            merge.new,
            merge.updated,
            dataset.data.len()
        );
        let outcome = self.finish_publish(&report, RunOutcome::Success, Some(summary)).await?;

        Ok(RunReport {
            outcome,
            merge,
            planned_dates,
            total_days: dataset.data.len(),
            config_changed,
            publish: Some(report),
            dataset,
        })
    }

    /// Republish the existing data with the failure recorded
    async fn degrade(
        &self,
        existing: Option<ExistingDataset>,
        now: DateTime<FixedOffset>,
        reason: String,
        planned_dates: usize,
        config_changed: bool,
    ) -> Result<RunReport, RunError> {
        let Some(existing) = existing.filter(|d| !d.is_empty()) else {
            warn!(reason = %reason, "No fresh data and no existing dataset");
            self.health.failure(Some(&format!("no data to serve: {}", reason))).await;
            return Err(RunError::NoData(reason));
        };

        warn!(
            reason = %reason,
            days = existing.data.len(),
            "No fresh data, republishing existing dataset"
        );

        // Stored metadata is kept as is apart from the failure bookkeeping;
        // the configured zone only labels metadata-less legacy documents.
        let last_updated = monotonic_timestamp(now, existing.metadata.as_ref());
        let metadata = match existing.metadata {
            Some(metadata) => DatasetMetadata {
                last_updated,
                last_failure: Some(now),
                failure_reason: Some(reason.clone()),
                ..metadata
            },
            None => DatasetMetadata {
                last_updated,
                timezone: self.config.timezone.name().to_string(),
                last_failure: Some(now),
                failure_reason: Some(reason.clone()),
            },
        };
        let dataset = Dataset {
            metadata,
            data: existing.data,
        };

        let report = self.publish(&dataset, config_changed).await?;
        let outcome = self
            .finish_publish(&report, RunOutcome::Warning(reason), None)
            .await?;

        Ok(RunReport {
            outcome,
            merge: MergeSummary::default(),
            planned_dates,
            total_days: dataset.data.len(),
            config_changed,
            publish: Some(report),
            dataset,
        })
    }

    async fn publish(
        &self,
        dataset: &Dataset,
        with_config: bool,
    ) -> Result<PublishReport, RunError> {
        let data_object =
            PublishObject::dataset(dataset).map_err(|e| RunError::Serialize(e.to_string()))?;
        let mut objects = vec![data_object];
        if with_config {
            objects.push(PublishObject::config_js(
                self.config.timezone.name(),
                self.config.public_url.as_deref(),
            ));
        }
        Ok(self.storage.publish_dataset(&objects).await)
    }

    /// Map a publish report onto the run outcome and send the terminal signal
    async fn finish_publish(
        &self,
        report: &PublishReport,
        on_success: RunOutcome,
        success_summary: Option<String>,
    ) -> Result<RunOutcome, RunError> {
        match report.outcome() {
            PublishOutcome::AllSucceeded => {
                match &on_success {
                    RunOutcome::Warning(message) => {
                        self.health.warning(Some(message.as_str())).await
                    }
                    _ => self.health.success(success_summary).await,
                }
                Ok(on_success)
            }
            PublishOutcome::Partial if report.escalating_failure().is_none() => {
                let message = format!("partial publish: {}", report.failure_summary());
                self.health.warning(Some(&message)).await;
                Ok(RunOutcome::Warning(message))
            }
            PublishOutcome::Partial | PublishOutcome::AllFailed => {
                let message = report
                    .escalating_failure()
                    .or_else(|| report.first_failure())
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| report.failure_summary());
                self.health.failure(Some(&message)).await;
                Err(RunError::Publish(message))
            }
        }
    }
}

fn log_plan(plan: &ReconciliationPlan, today: NaiveDate) {
    info!(
        %today,
        dates = plan.len(),
        missing = plan.count(Reason::MissingData),
        current = plan.count(Reason::EnsureCurrentData),
        recent = plan.count(Reason::CatchUpdates),
        forced = plan.count(Reason::ForcedOverride),
        "Reconciliation plan built"
    );
    if let Some(window) = plan.fetch_window() {
        info!(start = %window.start, end = %window.end, "Fetch window");
    }
}

/// `max(now, previous lastUpdated)`
fn monotonic_timestamp(
    now: DateTime<FixedOffset>,
    previous: Option<&DatasetMetadata>,
) -> DateTime<FixedOffset> {
    match previous {
        Some(metadata) if metadata.last_updated > now => metadata.last_updated,
        _ => now,
    }
}
