//! Retry for SQLite lock contention
//!
//! State writes race with cancellation and the detached access-log inserts,
//! so a write that hits `database is locked` is retried with doubling
//! backoff until its time budget runs out. Any other error returns at once.

use seedwave_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Backoff schedule for a lock-contended write
#[derive(Debug, Clone, Copy)]
pub struct LockRetry {
    pub budget: Duration,
    pub first_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(5),
            first_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl LockRetry {
    pub async fn run<F, Fut, T>(self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut backoff = self.first_backoff;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempts,
                            "Database write went through after lock contention"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if err.is_lock_contention() => err,
                Err(err) => return Err(err),
            };

            if started.elapsed() >= self.budget {
                tracing::error!(
                    operation = operation_name,
                    attempts,
                    budget_ms = self.budget.as_millis() as u64,
                    error = %err,
                    "Database still locked, giving up"
                );
                return Err(Error::Internal(format!(
                    "{}: database locked for {} ms over {} attempts",
                    operation_name,
                    started.elapsed().as_millis(),
                    attempts
                )));
            }

            tracing::warn!(
                operation = operation_name,
                attempts,
                backoff_ms = backoff.as_millis() as u64,
                "Database locked, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }
}
