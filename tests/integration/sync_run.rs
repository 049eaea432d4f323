//! End-to-end runs against in-memory collaborators

use crate::common::*;
use std::sync::atomic::Ordering;
use step_tracker_sync::fetcher::ProviderError;
use step_tracker_sync::runner::RunError;
use step_tracker_sync::sync::DateOverride;
use step_tracker_sync::{DailyRecord, ErrorKind, RunOutcome, CONFIG_OBJECT_KEY, DATA_OBJECT_KEY};

fn five_days() -> step_tracker_sync::Dataset {
    dataset(
        "2026-01-04T08:00:00Z",
        "UTC",
        &[
            ("2026-01-01", 9_100, 7.1),
            ("2026-01-02", 10_250, 8.25),
            ("2026-01-03", 12_000, 9.5),
            ("2026-01-04", 8_400, 6.75),
            ("2026-01-05", 6_000, 4.5),
        ],
    )
}

#[tokio::test]
async fn test_first_run_publishes_new_dataset() {
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(vec![entry("2026-01-01", 10_000, 8_000.0)]),
        MemoryStore::default(),
        "2026-01-01T09:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.merge.new, 1);
    assert_eq!(report.total_days, 1);
    assert!(report.config_changed);
    assert_eq!(
        h.provider.windows.lock().unwrap().as_slice(),
        &[(date("2026-01-01"), date("2026-01-01"))]
    );

    let stored = h.store.stored_dataset();
    assert_eq!(
        stored.data[&date("2026-01-01")],
        DailyRecord {
            steps: 10_000,
            km: 8.0
        }
    );
    assert_eq!(stored.metadata.timezone, "UTC");
    assert_eq!(
        stored.metadata.last_updated,
        utc("2026-01-01T09:00:00Z").fixed_offset()
    );
    assert!(stored.metadata.last_failure.is_none());

    let data = h.store.object(DATA_OBJECT_KEY).unwrap();
    assert_eq!(data.content_type, "application/json");
    assert_eq!(data.cache_control, "max-age=300");

    let config = h.store.object(CONFIG_OBJECT_KEY).unwrap();
    let script = String::from_utf8(config.body).unwrap();
    assert_eq!(config.content_type, "application/javascript");
    assert_eq!(config.cache_control, "max-age=3600");
    assert!(script.contains("TIMEZONE: 'UTC'"));
    assert!(script.contains("R2_DATA_URL: 'https://pub.example.com/steps_data.json'"));

    assert_eq!(h.health.suffixes(), vec!["/start", ""]);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_outage_keeps_existing_data() {
    let existing = five_days();
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::always_failing_fetch(ProviderError::transport(
            "connection reset by peer",
        )),
        MemoryStore::with_dataset(&existing),
        "2026-01-05T10:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::Warning(_)));
    assert_eq!(h.provider.fetch_calls.load(Ordering::SeqCst), 6);
    assert_eq!(
        h.provider.windows.lock().unwrap()[0],
        (date("2026-01-03"), date("2026-01-05"))
    );

    let stored = h.store.stored_dataset();
    assert_eq!(stored.data, existing.data);
    assert_eq!(
        stored.metadata.last_failure,
        Some(utc("2026-01-05T10:00:00Z").fixed_offset())
    );
    assert!(stored
        .metadata
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("connection reset by peer"));

    // zone unchanged, so only the dataset is republished
    assert!(h.store.object(CONFIG_OBJECT_KEY).is_none());

    let (suffix, body) = h.health.last();
    assert_eq!(suffix, "/log");
    assert!(body.unwrap().starts_with("Step tracker warning:"));
}

#[tokio::test]
async fn test_unchanged_run_skips_publish() {
    let existing = five_days();
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(vec![
            entry("2026-01-03", 12_000, 9_500.0),
            entry("2026-01-04", 8_400, 6_750.0),
            entry("2026-01-05", 6_000, 4_500.0),
        ]),
        MemoryStore::with_dataset(&existing),
        "2026-01-05T10:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Unchanged);
    assert_eq!(report.merge.unchanged, 3);
    assert!(report.publish.is_none());
    assert_eq!(h.store.total_puts(), 0);
    assert_eq!(
        h.health.last(),
        ("".to_string(), Some("No changes, 5 days tracked".to_string()))
    );
}

#[tokio::test]
async fn test_timezone_change_republishes_config() {
    let mut existing = five_days();
    existing.metadata.timezone = "Australia/Sydney".to_string();
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(vec![
            entry("2026-01-03", 12_000, 9_500.0),
            entry("2026-01-04", 8_400, 6_750.0),
            entry("2026-01-05", 6_000, 4_500.0),
        ]),
        MemoryStore::with_dataset(&existing),
        "2026-01-05T10:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(report.config_changed);
    assert!(!report.merge.has_changes());
    assert_eq!(h.store.stored_dataset().metadata.timezone, "UTC");
    assert!(h.store.object(CONFIG_OBJECT_KEY).is_some());
}

#[tokio::test]
async fn test_legacy_dataset_is_upgraded() {
    let store = MemoryStore::default();
    store.insert_raw(DATA_OBJECT_KEY, br#"{"2026-01-01": 8000}"#.to_vec());
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(vec![
            entry("2026-01-01", 8_000, 6_400.0),
            entry("2026-01-02", 3_000, 2_000.0),
        ]),
        store,
        "2026-01-02T12:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.merge.updated, 1);
    assert_eq!(report.merge.new, 1);

    let stored = h.store.stored_dataset();
    assert_eq!(
        stored.data[&date("2026-01-01")],
        DailyRecord {
            steps: 8_000,
            km: 6.4
        }
    );
    assert_eq!(
        stored.data[&date("2026-01-02")],
        DailyRecord {
            steps: 3_000,
            km: 2.0
        }
    );
}

#[tokio::test]
async fn test_forced_range_fetches_only_that_range() {
    let config = utc_config("2026-01-01").with_forced_range(Some(
        DateOverride::new(date("2026-01-02"), date("2026-01-03")).unwrap(),
    ));
    let h = harness(
        config,
        ScriptedProvider::returning(vec![entry("2026-01-02", 11_000, 8_800.0)]),
        MemoryStore::with_dataset(&five_days()),
        "2026-01-05T10:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.planned_dates, 2);
    assert_eq!(report.merge.updated, 1);
    assert_eq!(
        h.provider.windows.lock().unwrap().as_slice(),
        &[(date("2026-01-02"), date("2026-01-03"))]
    );
}

#[tokio::test]
async fn test_rejected_credentials_fail_without_retry() {
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::failing_login(ProviderError::http(401, "HTTP 401: Unauthorized")),
        MemoryStore::with_dataset(&five_days()),
        "2026-01-05T10:00:00Z",
    );

    let err = h.runner.run().await.unwrap_err();

    match err {
        RunError::Authentication(e) => assert_eq!(e.kind, ErrorKind::Authentication),
        other => panic!("expected authentication failure, got {other:?}"),
    }
    assert_eq!(h.provider.login_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.provider.fetch_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.total_puts(), 0);
    assert_eq!(h.health.last().0, "/fail");
}

#[tokio::test(start_paused = true)]
async fn test_login_outage_exhausts_retries() {
    let provider = ScriptedProvider::default();
    for _ in 0..4 {
        provider
            .logins
            .lock()
            .unwrap()
            .push_back(Err(ProviderError::transport("connection refused")));
    }
    let h = harness(
        utc_config("2026-01-01"),
        provider,
        MemoryStore::default(),
        "2026-01-05T10:00:00Z",
    );

    let err = h.runner.run().await.unwrap_err();

    assert!(matches!(err, RunError::Login(ref e) if e.kind == ErrorKind::NetworkTransport));
    assert_eq!(h.provider.login_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_invalid_fetch_request_is_fatal() {
    let provider = ScriptedProvider::default();
    provider
        .fetches
        .lock()
        .unwrap()
        .push_back(Err(ProviderError::http(400, "HTTP 400: Bad Request")));
    let h = harness(
        utc_config("2026-01-01"),
        provider,
        MemoryStore::with_dataset(&five_days()),
        "2026-01-05T10:00:00Z",
    );

    let err = h.runner.run().await.unwrap_err();

    assert!(matches!(err, RunError::Fetch(ref e) if e.kind == ErrorKind::ApiRequestError));
    assert_eq!(h.provider.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.total_puts(), 0);
}

#[tokio::test]
async fn test_empty_fetch_without_existing_data_fails() {
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(Vec::new()),
        MemoryStore::default(),
        "2026-01-05T10:00:00Z",
    );

    let err = h.runner.run().await.unwrap_err();

    assert!(matches!(err, RunError::NoData(_)));
    assert_eq!(h.store.total_puts(), 0);
    let (suffix, body) = h.health.last();
    assert_eq!(suffix, "/fail");
    assert!(body.unwrap().contains("no data to serve"));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_outage_keeps_stored_timezone() {
    let mut existing = five_days();
    existing.metadata.timezone = "Australia/Sydney".to_string();
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::always_failing_fetch(ProviderError::transport("connection timed out")),
        MemoryStore::with_dataset(&existing),
        "2026-01-05T10:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert!(matches!(report.outcome, RunOutcome::Warning(_)));
    let stored = h.store.stored_dataset();
    assert_eq!(stored.metadata.timezone, "Australia/Sydney");
    assert_eq!(stored.data, existing.data);
    assert_eq!(
        stored.metadata.last_updated,
        utc("2026-01-05T10:00:00Z").fixed_offset()
    );
    assert_eq!(
        stored.metadata.last_failure,
        Some(utc("2026-01-05T10:00:00Z").fixed_offset())
    );
    assert!(stored.metadata.failure_reason.is_some());
}

#[tokio::test]
async fn test_empty_fetch_republishes_legacy_dataset() {
    let store = MemoryStore::default();
    store.insert_raw(
        DATA_OBJECT_KEY,
        br#"{"2026-01-01": 8000, "2026-01-02": 9500}"#.to_vec(),
    );
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(Vec::new()),
        store,
        "2026-01-02T12:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    match &report.outcome {
        RunOutcome::Warning(message) => assert!(message.contains("no data returned")),
        other => panic!("expected warning, got {other:?}"),
    }
    assert!(report.config_changed);

    let stored = h.store.stored_dataset();
    assert_eq!(stored.metadata.timezone, "UTC");
    assert_eq!(
        stored.metadata.last_failure,
        Some(utc("2026-01-02T12:00:00Z").fixed_offset())
    );
    assert_eq!(
        stored.data[&date("2026-01-02")],
        DailyRecord {
            steps: 9_500,
            km: 0.0
        }
    );
    assert!(h.store.object(CONFIG_OBJECT_KEY).is_some());
}

#[tokio::test]
async fn test_last_updated_never_moves_backwards() {
    let mut existing = five_days();
    existing.metadata.last_updated = utc("2026-01-06T00:00:00Z").fixed_offset();
    let h = harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(vec![entry("2026-01-05", 7_500, 5_600.0)]),
        MemoryStore::with_dataset(&existing),
        "2026-01-05T10:00:00Z",
    );

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.merge.updated, 1);
    assert_eq!(
        h.store.stored_dataset().metadata.last_updated,
        utc("2026-01-06T00:00:00Z").fixed_offset()
    );
}
