/// Retry classification for failed statements
///
/// A statement that fails with a retryable code is sent once more before its
/// error is reported. The set is explicit: connection-loss codes and transient
/// lock contention retry, handshake-class failures (unknown host, refused
/// connection) never do.
use std::collections::BTreeSet;

use crate::constants::codes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    retryable: BTreeSet<u32>,
}

impl RetryPolicy {
    /// Codes retried by default.
    pub const DEFAULT_CODES: [u32; 5] = [
        codes::CR_SERVER_GONE_ERROR,
        codes::CR_SERVER_LOST,
        codes::ER_SERVER_SHUTDOWN,
        codes::SQLITE_BUSY,
        codes::SQLITE_LOCKED,
    ];

    /// Policy that never retries.
    pub fn never() -> Self {
        Self {
            retryable: BTreeSet::new(),
        }
    }

    pub fn with_codes(codes: impl IntoIterator<Item = u32>) -> Self {
        Self {
            retryable: codes.into_iter().collect(),
        }
    }

    pub fn should_retry(&self, code: u32) -> bool {
        code != 0 && self.retryable.contains(&code)
    }

    pub fn codes(&self) -> impl Iterator<Item = u32> + '_ {
        self.retryable.iter().copied()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_codes(Self::DEFAULT_CODES)
    }
}
