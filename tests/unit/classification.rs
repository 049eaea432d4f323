//! Classification through the public API

use step_tracker_sync::classify::{classify_fitness_error, classify_storage_error, FitnessCall};
use step_tracker_sync::{ErrorKind, Subsystem};

#[test]
fn test_storage_classification_is_deterministic() {
    let first = classify_storage_error(Some("SlowDown"), "Please reduce your request rate");
    let second = classify_storage_error(Some("SlowDown"), "Please reduce your request rate");

    assert_eq!(first, second);
    assert_eq!(first.kind, ErrorKind::Throttled);
    assert_eq!(first.subsystem, Subsystem::Storage);
    assert!(first.is_retryable());
}

#[test]
fn test_access_denied_is_not_retryable() {
    let err = classify_storage_error(Some("AccessDenied"), "Access Denied");

    assert_eq!(err.kind, ErrorKind::Authentication);
    assert_eq!(err.code.as_deref(), Some("AccessDenied"));
    assert!(!err.is_retryable());
    assert_eq!(
        err.to_string(),
        "R2 authentication error (AccessDenied): Access Denied"
    );
}

#[test]
fn test_storage_code_beats_message() {
    // message mentions a timeout, but the service code says capacity
    let err = classify_storage_error(Some("EntityTooLarge"), "upload timeout after 30s");
    assert_eq!(err.kind, ErrorKind::StorageCapacity);
}

#[test]
fn test_fitness_status_and_message_paths() {
    let throttled = classify_fitness_error(
        Some(429),
        "HTTP 429: Too Many Requests",
        FitnessCall::Fetch,
    );
    assert_eq!(throttled.kind, ErrorKind::TransientUnknown);

    let reset = classify_fitness_error(None, "Connection reset by peer", FitnessCall::Login);
    assert_eq!(reset.kind, ErrorKind::NetworkTransport);

    let not_found = classify_fitness_error(Some(404), "HTTP 404: Not Found", FitnessCall::Fetch);
    assert_eq!(not_found.kind, ErrorKind::ApiRequestError);
    assert!(!not_found.is_retryable());

    let garbled = classify_fitness_error(None, "unexpected end of stream", FitnessCall::Fetch);
    assert_eq!(garbled.kind, ErrorKind::TransientUnknown);
    assert_eq!(garbled.subsystem, Subsystem::Fitness);
}
