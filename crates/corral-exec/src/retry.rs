use crate::command::RETRY_SENTINEL;
use std::time::Duration;
use tracing::debug;

/// Bounds for polling a query that may answer `[RETRY]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

pub fn is_retry_sentinel(output: &[u8]) -> bool {
    output == RETRY_SENTINEL.as_bytes()
}

/// Call `query` until it answers something other than `[RETRY]`, at most
/// `policy.attempts` times, sleeping `policy.interval` between calls.
///
/// The last answer is returned as-is, so callers must still handle a final
/// `[RETRY]`. Errors end the loop immediately.
pub fn poll_with_retry<E, F>(policy: RetryPolicy, mut query: F) -> Result<Vec<u8>, E>
where
    F: FnMut(u32) -> Result<Vec<u8>, E>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let output = query(attempt)?;
        if !is_retry_sentinel(&output) || attempt >= attempts {
            return Ok(output);
        }
        debug!("no data yet (attempt {attempt}/{attempts}), retrying");
        std::thread::sleep(policy.interval);
        attempt += 1;
    }
}
