// SPDX-FileCopyrightText: 2026 Purser Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for best-effort external calls.
//!
//! Used by the notify paths: the durable mutation has already committed
//! by the time a retry runs, so retries never re-execute ledger state.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::PurserError;

/// Retry policy for transient transport failures.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Runs `op`, retrying transient failures per `policy`.
///
/// Non-transient errors (see [`PurserError::is_transient`]) propagate
/// immediately without a retry.
pub async fn retry<T, F, Fut>(
    policy: &BackoffPolicy,
    what: &str,
    mut op: F,
) -> Result<T, PurserError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PurserError>>,
{
    let mut delay = policy.base_delay;
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                warn!(attempt, error = %err, "{what}: transient failure, retrying");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
