//! Retry policy tests

use crate::constants::codes;
use crate::retry::RetryPolicy;

#[test]
fn test_default_retries_connection_loss() {
    let policy = RetryPolicy::default();

    assert!(policy.should_retry(codes::CR_SERVER_GONE_ERROR));
    assert!(policy.should_retry(codes::CR_SERVER_LOST));
    assert!(policy.should_retry(codes::ER_SERVER_SHUTDOWN));
    assert!(policy.should_retry(codes::SQLITE_BUSY));
    assert!(policy.should_retry(codes::SQLITE_LOCKED));
}

#[test]
fn test_default_never_retries_handshake_failures() {
    let policy = RetryPolicy::default();

    assert!(!policy.should_retry(codes::CR_CONNECTION_ERROR));
    assert!(!policy.should_retry(codes::CR_CONN_HOST_ERROR));
    assert!(!policy.should_retry(codes::CR_UNKNOWN_HOST));
    assert!(!policy.should_retry(codes::SQLITE_ERROR));
    assert!(!policy.should_retry(0));
}

#[test]
fn test_custom_codes() {
    let policy = RetryPolicy::with_codes([0, 1205]);

    assert!(policy.should_retry(1205));
    assert!(!policy.should_retry(0), "success is never retried");
    assert!(!policy.should_retry(codes::CR_SERVER_LOST));
    assert_eq!(policy.codes().collect::<Vec<_>>(), vec![0, 1205]);
}

#[test]
fn test_never() {
    let policy = RetryPolicy::never();
    assert!(RetryPolicy::DEFAULT_CODES
        .iter()
        .all(|&code| !policy.should_retry(code)));
    assert_eq!(policy.codes().count(), 0);
}
