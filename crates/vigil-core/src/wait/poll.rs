use crate::model::{CheckStatus, RunStatus};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Call `predicate` until it returns `true` (→ `Ok(true)`) or `duration` has
/// elapsed since the first call (→ `Ok(false)`), sleeping `sleep_for` after
/// each unsuccessful attempt.
///
/// The budget is checked before every call, so no call starts after it is
/// spent. A budget too large to represent as a deadline never runs out. A
/// predicate error ends the poll and is returned as is.
pub async fn call_until_true<F, Fut, E>(
    mut predicate: F,
    duration: Duration,
    sleep_for: Duration,
) -> Result<bool, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now().checked_add(duration);
    while deadline.map_or(true, |d| Instant::now() < d) {
        if predicate().await? {
            return Ok(true);
        }
        tracing::debug!(event = "poll.sleep", sleep_ms = sleep_for.as_millis() as u64);
        tokio::time::sleep(sleep_for).await;
    }
    Ok(false)
}

/// A status that can report itself as a terminal failure.
pub trait ReportsError {
    fn is_error(&self) -> bool;
}

impl ReportsError for String {
    fn is_error(&self) -> bool {
        self.eq_ignore_ascii_case("error")
    }
}

impl ReportsError for CheckStatus {
    fn is_error(&self) -> bool {
        matches!(self, CheckStatus::Error | CheckStatus::Failure)
    }
}

impl ReportsError for RunStatus {
    fn is_error(&self) -> bool {
        false
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("{resource} failed to get to expected status {expected}: in {status} state")]
    ErrorState {
        resource: String,
        expected: String,
        status: String,
    },

    #[error("timed out waiting for {resource} to become {expected}")]
    TimedOut { resource: String, expected: String },

    #[error("status fetch failed: {0:#}")]
    Fetch(anyhow::Error),
}

/// Poll `fetch` until the resource reports `expected`.
///
/// An error status fails immediately with [`WaitError::ErrorState`]; an
/// exhausted budget fails with [`WaitError::TimedOut`].
pub async fn wait_for_status<S, F, Fut>(
    resource: &str,
    mut fetch: F,
    expected: &S,
    duration: Duration,
    sleep_for: Duration,
) -> Result<(), WaitError>
where
    S: PartialEq + Display + ReportsError,
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<S>>,
{
    let reached = call_until_true(
        || {
            let pending = fetch();
            async move {
                let status = pending.await.map_err(WaitError::Fetch)?;
                if status == *expected {
                    return Ok(true);
                }
                if status.is_error() {
                    return Err(WaitError::ErrorState {
                        resource: resource.to_string(),
                        expected: expected.to_string(),
                        status: status.to_string(),
                    });
                }
                tracing::debug!(
                    event = "wait.pending",
                    resource,
                    expected = %expected,
                    current = %status,
                );
                Ok(false)
            }
        },
        duration,
        sleep_for,
    )
    .await?;

    if reached {
        Ok(())
    } else {
        Err(WaitError::TimedOut {
            resource: resource.to_string(),
            expected: expected.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_never_calls() {
        let mut calls = 0;
        let ok = call_until_true(
            || {
                calls += 1;
                async { Ok::<_, anyhow::Error>(true) }
            },
            Duration::ZERO,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(!ok);
        assert_eq!(calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_budget_does_not_overflow() {
        let mut calls = 0;
        let ok = call_until_true(
            || {
                calls += 1;
                let done = calls == 2;
                async move { Ok::<_, anyhow::Error>(done) }
            },
            Duration::from_secs(u64::MAX),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(ok);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_string_error_status_is_case_insensitive() {
        assert!("ERROR".to_string().is_error());
        assert!(!"ACTIVE".to_string().is_error());
        assert!(CheckStatus::Failure.is_error());
        assert!(!CheckStatus::Stopped.is_error());
    }
}
