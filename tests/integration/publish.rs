//! Publishing through the storage gateway

use crate::common::*;
use std::sync::Arc;
use step_tracker_sync::fetcher::FitnessClient;
use step_tracker_sync::runner::RunError;
use step_tracker_sync::storage::{
    LocalMirror, PublishObject, PublishOutcome, StorageGateway, StorageSettings, StoreError,
};
use step_tracker_sync::sync::merge_entries;
use step_tracker_sync::{
    Dataset, ErrorKind, RunOutcome, SyncRunner, CONFIG_OBJECT_KEY, DATA_OBJECT_KEY,
};

fn fresh_run(store: MemoryStore) -> Harness {
    harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(vec![entry("2026-01-01", 10_000, 8_000.0)]),
        store,
        "2026-01-01T09:00:00Z",
    )
}

#[tokio::test(start_paused = true)]
async fn test_partial_publish_is_a_warning() {
    let store = MemoryStore::default();
    store.fail_uploads(
        CONFIG_OBJECT_KEY,
        StoreError::with_code("ServiceUnavailable", "Service Unavailable"),
    );
    let h = fresh_run(store);

    let report = h.runner.run().await.unwrap();

    match &report.outcome {
        RunOutcome::Warning(message) => assert!(message.starts_with("partial publish:")),
        other => panic!("expected warning, got {other:?}"),
    }
    let publish = report.publish.as_ref().unwrap();
    assert_eq!(publish.outcome(), PublishOutcome::Partial);
    assert_eq!(publish.succeeded, vec![DATA_OBJECT_KEY.to_string()]);
    assert_eq!(publish.failed[0].0, CONFIG_OBJECT_KEY);
    assert_eq!(publish.failed[0].1.kind, ErrorKind::ServiceUnavailable);

    assert_eq!(h.store.attempts_for(DATA_OBJECT_KEY), 1);
    assert_eq!(h.store.attempts_for(CONFIG_OBJECT_KEY), 4);
    assert!(h.store.object(DATA_OBJECT_KEY).is_some());

    let (suffix, body) = h.health.last();
    assert_eq!(suffix, "/log");
    assert!(body
        .unwrap()
        .starts_with("Step tracker warning: partial publish:"));
}

#[tokio::test]
async fn test_access_denied_escalates_to_failure() {
    let store = MemoryStore::default();
    store.fail_uploads(
        CONFIG_OBJECT_KEY,
        StoreError::with_code("AccessDenied", "Access Denied"),
    );
    let h = fresh_run(store);

    let err = h.runner.run().await.unwrap_err();

    assert!(matches!(err, RunError::Publish(ref message) if message.contains("AccessDenied")));
    assert_eq!(h.store.attempts_for(CONFIG_OBJECT_KEY), 1);
    assert_eq!(h.health.last().0, "/fail");
}

#[tokio::test(start_paused = true)]
async fn test_all_uploads_failing_is_a_failure() {
    let store = MemoryStore::default();
    for key in [DATA_OBJECT_KEY, CONFIG_OBJECT_KEY] {
        store.fail_uploads(key, StoreError::new("connection reset"));
    }
    let h = fresh_run(store);

    let err = h.runner.run().await.unwrap_err();

    assert!(matches!(err, RunError::Publish(_)));
    assert_eq!(h.store.attempts_for(DATA_OBJECT_KEY), 4);
    assert_eq!(h.store.attempts_for(CONFIG_OBJECT_KEY), 4);
}

#[tokio::test]
async fn test_missing_storage_configuration_fails_publish() {
    let store = Arc::new(MemoryStore::default());
    let provider = Arc::new(ScriptedProvider::returning(vec![entry(
        "2026-01-01",
        10_000,
        8_000.0,
    )]));
    let health = Arc::new(RecordingHealth::default());
    let runner = SyncRunner::new(
        utc_config("2026-01-01"),
        FitnessClient::new(provider),
        StorageGateway::new(
            Arc::new(MemoryConnector {
                store: store.clone(),
            }),
            StorageSettings::default(),
        ),
        health.clone(),
    )
    .with_fixed_now(utc("2026-01-01T09:00:00Z"));

    let err = runner.run().await.unwrap_err();

    match err {
        RunError::Publish(message) => {
            assert!(message.contains("storage configuration incomplete"))
        }
        other => panic!("expected publish failure, got {other:?}"),
    }
    assert_eq!(store.total_puts(), 0);
    assert_eq!(store.gets.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_publish_succeeds_trivially() {
    let store = Arc::new(MemoryStore::default());
    let report = gateway(&store).publish_dataset(&[]).await;

    assert_eq!(report.outcome(), PublishOutcome::AllSucceeded);
    assert_eq!(store.total_puts(), 0);
}

#[tokio::test]
async fn test_mirror_written_even_when_upload_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    store.fail_uploads(
        DATA_OBJECT_KEY,
        StoreError::with_code("InvalidAccessKeyId", "bad key"),
    );
    let gateway = gateway(&store).with_mirror(LocalMirror::new(dir.path()));

    let object = PublishObject::dataset(&dataset(
        "2026-01-01T09:00:00Z",
        "UTC",
        &[("2026-01-01", 10_000, 8.0)],
    ))
    .unwrap();
    let report = gateway.publish_dataset(std::slice::from_ref(&object)).await;

    assert_eq!(report.outcome(), PublishOutcome::AllFailed);
    let mirrored = std::fs::read(dir.path().join(DATA_OBJECT_KEY)).unwrap();
    assert_eq!(mirrored, object.body);
}

/// Two overlapping runs each read the same snapshot; the later upload wins
/// and the earlier run's new day is lost. There is no locking.
#[tokio::test]
async fn test_concurrent_runs_last_writer_wins() {
    let base = dataset("2026-01-01T09:00:00Z", "UTC", &[("2026-01-01", 9_000, 7.0)]);
    let store = Arc::new(MemoryStore::with_dataset(&base));
    let first = gateway(&store);
    let second = gateway(&store);
    let today = date("2026-01-03");

    let mut seen_by_first = first.download_dataset().await.unwrap();
    let mut seen_by_second = second.download_dataset().await.unwrap();

    merge_entries(
        &mut seen_by_first.data,
        &[entry("2026-01-02", 11_000, 8_800.0)],
        today,
    );
    merge_entries(
        &mut seen_by_second.data,
        &[entry("2026-01-03", 12_000, 9_600.0)],
        today,
    );

    for (gateway, data) in [(&first, seen_by_first.data), (&second, seen_by_second.data)] {
        let dataset = Dataset {
            metadata: base.metadata.clone(),
            data,
        };
        let report = gateway
            .publish_dataset(&[PublishObject::dataset(&dataset).unwrap()])
            .await;
        assert_eq!(report.outcome(), PublishOutcome::AllSucceeded);
    }

    let stored = store.stored_dataset();
    assert!(stored.data.contains_key(&date("2026-01-03")));
    assert!(!stored.data.contains_key(&date("2026-01-02")));
}

/// Stored zone differs from the configured one, so a degraded run
/// republishes both objects.
fn degraded_run(store: MemoryStore) -> Harness {
    harness(
        utc_config("2026-01-01"),
        ScriptedProvider::returning(Vec::new()),
        store,
        "2026-01-02T09:00:00Z",
    )
}

fn sydney_dataset() -> Dataset {
    dataset(
        "2026-01-01T09:00:00Z",
        "Australia/Sydney",
        &[("2026-01-01", 9_000, 7.0), ("2026-01-02", 4_000, 3.1)],
    )
}

#[tokio::test(start_paused = true)]
async fn test_degraded_run_with_partial_publish_is_a_warning() {
    let store = MemoryStore::with_dataset(&sydney_dataset());
    store.fail_uploads(
        CONFIG_OBJECT_KEY,
        StoreError::with_code("ServiceUnavailable", "Service Unavailable"),
    );
    let h = degraded_run(store);

    let report = h.runner.run().await.unwrap();

    match &report.outcome {
        RunOutcome::Warning(message) => assert!(message.starts_with("partial publish:")),
        other => panic!("expected warning, got {other:?}"),
    }
    assert_eq!(h.store.attempts_for(CONFIG_OBJECT_KEY), 4);
    assert!(h.store.stored_dataset().metadata.last_failure.is_some());
    assert_eq!(h.health.last().0, "/log");
}

#[tokio::test]
async fn test_degraded_run_with_access_denied_fails() {
    let store = MemoryStore::with_dataset(&sydney_dataset());
    store.fail_uploads(
        CONFIG_OBJECT_KEY,
        StoreError::with_code("AccessDenied", "Access Denied"),
    );
    let h = degraded_run(store);

    let err = h.runner.run().await.unwrap_err();

    assert!(matches!(err, RunError::Publish(ref message) if message.contains("AccessDenied")));
    assert_eq!(h.store.attempts_for(DATA_OBJECT_KEY), 1);
    assert_eq!(h.store.attempts_for(CONFIG_OBJECT_KEY), 1);
    assert_eq!(h.health.last().0, "/fail");
}
