//! Fitness provider error classification
//!
//! Login and data-fetch calls are classified separately: an "invalid request"
//! or "not found" during login is not an API misuse we can name, so only fetch
//! calls get the [`ErrorKind::ApiRequestError`] rule.

use super::{first_match, ClassifiedError, ErrorKind, MessageRule, Subsystem};

/// Which fitness call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitnessCall {
    /// Session login
    Login,
    /// Daily statistics fetch
    Fetch,
}

const AUTH_NEEDLES: &[&str] = &[
    "authentication",
    "credential",
    "login",
    "password",
    "unauthorized",
    "forbidden",
];

const NETWORK_NEEDLES: &[&str] = &["network", "connection", "timeout", "dns", "socket"];

const TEMPORARY_NEEDLES: &[&str] = &["rate limit", "too many", "busy", "server"];

const API_NEEDLES: &[&str] = &["api", "invalid request", "400", "404", "not found"];

const LOGIN_RULES: &[MessageRule] = &[
    MessageRule::any_of(AUTH_NEEDLES, ErrorKind::Authentication),
    MessageRule::any_of(NETWORK_NEEDLES, ErrorKind::NetworkTransport),
    MessageRule::any_of(TEMPORARY_NEEDLES, ErrorKind::TransientUnknown),
    MessageRule::server_status(ErrorKind::TransientUnknown),
];

const FETCH_RULES: &[MessageRule] = &[
    MessageRule::any_of(AUTH_NEEDLES, ErrorKind::Authentication),
    MessageRule::any_of(NETWORK_NEEDLES, ErrorKind::NetworkTransport),
    MessageRule::any_of(TEMPORARY_NEEDLES, ErrorKind::TransientUnknown),
    MessageRule::server_status(ErrorKind::TransientUnknown),
    MessageRule::any_of(API_NEEDLES, ErrorKind::ApiRequestError),
];

/// Classify a fitness provider failure.
///
/// The HTTP status is consulted first when the transport supplied one; the
/// message table decides otherwise. Unmatched failures are
/// [`ErrorKind::TransientUnknown`] and therefore retried.
pub fn classify_fitness_error(
    status: Option<u16>,
    message: &str,
    call: FitnessCall,
) -> ClassifiedError {
    let kind = status
        .and_then(|code| kind_for_status(code, call))
        .or_else(|| {
            let rules = match call {
                FitnessCall::Login => LOGIN_RULES,
                FitnessCall::Fetch => FETCH_RULES,
            };
            first_match(rules, message)
        })
        .unwrap_or(ErrorKind::TransientUnknown);

    ClassifiedError::new(Subsystem::Fitness, kind, message)
}

fn kind_for_status(status: u16, call: FitnessCall) -> Option<ErrorKind> {
    match status {
        401 | 403 => Some(ErrorKind::Authentication),
        429 | 500..=599 => Some(ErrorKind::TransientUnknown),
        400 | 404 if call == FitnessCall::Fetch => Some(ErrorKind::ApiRequestError),
        _ => None,
    }
}
