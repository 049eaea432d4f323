//! Object storage error classification
//!
//! S3-compatible backends report a structured error code for most failures.
//! The code decides; the message is only consulted when the failure never
//! reached the service (no code).

use super::{first_match, ClassifiedError, ErrorKind, MessageRule, Subsystem};

const CODE_TABLE: &[(&[&str], ErrorKind)] = &[
    (
        &[
            "NoCredentialsError",
            "InvalidAccessKeyId",
            "SignatureDoesNotMatch",
            "NoSuchBucket",
            "AccessDenied",
        ],
        ErrorKind::Authentication,
    ),
    (
        &["SlowDown", "RequestLimitExceeded", "TooManyRequests"],
        ErrorKind::Throttled,
    ),
    (
        &["ServiceUnavailable", "RequestTimeout", "InternalError"],
        ErrorKind::ServiceUnavailable,
    ),
    (
        &["BucketNotEmpty", "EntityTooLarge", "InsufficientStorage"],
        ErrorKind::StorageCapacity,
    ),
    (
        &["NetworkingError", "ConnectionError"],
        ErrorKind::NetworkTransport,
    ),
];

const MESSAGE_RULES: &[MessageRule] = &[
    MessageRule::any_of(
        &["network", "connection", "timeout", "dns"],
        ErrorKind::NetworkTransport,
    ),
    MessageRule::any_of(
        &["credential", "auth", "permission"],
        ErrorKind::Authentication,
    ),
];

/// Classify an object storage failure.
///
/// Unrecognized codes and unmatched messages are treated as
/// [`ErrorKind::ServiceUnavailable`] and therefore retried.
pub fn classify_storage_error(code: Option<&str>, message: &str) -> ClassifiedError {
    match code {
        Some(code) => {
            let kind = kind_for_code(code).unwrap_or(ErrorKind::ServiceUnavailable);
            ClassifiedError::new(Subsystem::Storage, kind, message).with_code(code)
        }
        None => {
            let kind = first_match(MESSAGE_RULES, message).unwrap_or(ErrorKind::ServiceUnavailable);
            ClassifiedError::new(Subsystem::Storage, kind, message)
        }
    }
}

fn kind_for_code(code: &str) -> Option<ErrorKind> {
    CODE_TABLE
        .iter()
        .find(|(codes, _)| codes.contains(&code))
        .map(|(_, kind)| *kind)
}
