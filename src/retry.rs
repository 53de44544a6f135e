use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::error::{MigrationError, Result};
use crate::migration_state::MigrationState;
use crate::platform::MigrationStatus;

/// Result of a bounded retry.
///
/// `Exhausted` keeps the last value seen so callers can still report what
/// the remote side looked like when we gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Success(T),
    Exhausted { last: T, attempts: u32 },
}

/// Bounded "retry until the value looks right" policy, used for values that
/// populate shortly after a migration finishes (the migration log URL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calls `action` until `should_retry` returns false for its result, at
    /// most `max_attempts` times in total, sleeping `interval` between calls.
    ///
    /// Errors from `action` are returned immediately; only unsatisfying
    /// results are retried.
    pub async fn retry_on_result<T, F, Fut, P>(
        &self,
        mut action: F,
        should_retry: P,
        wait_message: &str,
        cancel: &CancellationToken,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&T) -> bool,
    {
        let mut attempts = 0;

        loop {
            let result = action().await?;
            attempts += 1;

            if !should_retry(&result) {
                return Ok(RetryOutcome::Success(result));
            }

            if attempts >= self.max_attempts {
                debug!("Giving up after {attempts} attempts");
                return Ok(RetryOutcome::Exhausted {
                    last: result,
                    attempts,
                });
            }

            sleep(self.interval, cancel).await?;
            info!("{wait_message}");
        }
    }
}

/// Sleeps for `interval` unless `cancel` fires first.
pub async fn sleep(interval: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(MigrationError::Cancelled),
        () = tokio::time::sleep(interval) => Ok(()),
    }
}

/// Polls a migration job until it reaches a terminal state.
///
/// There is no attempt ceiling: a large repository can legitimately migrate
/// for hours. The loop only ends on a terminal state, an error from
/// `fetch` (including an unrecognized state name), or cancellation.
pub async fn poll_until_terminal<F, Fut>(
    migration_id: &str,
    mut fetch: F,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(MigrationState, MigrationStatus)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<MigrationStatus>>,
{
    loop {
        let status = fetch().await?;
        let state = status.state.parse::<MigrationState>()?;

        if state.is_terminal() {
            return Ok((state, status));
        }

        info!(
            "Migration {migration_id} for {} is {state}, waiting {} seconds...",
            status.repository_name,
            interval.as_secs()
        );
        sleep(interval, cancel).await?;
    }
}
