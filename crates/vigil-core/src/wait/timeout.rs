use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{call} terminated with the timeout of {} seconds. Please check that this service timeout meets your expectation.",
    .limit.as_secs_f64()
)]
pub struct DeadlineExceeded {
    /// The call that was still in flight when the deadline fired.
    pub call: String,
    pub limit: Duration,
}

/// Label of the call currently awaited inside one guarded run.
///
/// Each [`ExecutionTimeout::run`] creates its own handle and hands it to the
/// work, so concurrent runs never see each other's labels. On expiry the
/// guard reports the label instead of its own call name.
#[derive(Debug, Clone, Default)]
pub struct InflightCall(Arc<Mutex<Option<String>>>);

impl InflightCall {
    /// Await `fut` with `label` recorded as the in-flight call.
    pub async fn call<F: Future>(&self, label: &str, fut: F) -> F::Output {
        let previous = self.replace(Some(label.to_string()));
        let out = fut.await;
        // Only reached on completion; a cancelled call leaves its label behind.
        self.replace(previous);
        out
    }

    pub fn current(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn replace(&self, label: Option<String>) -> Option<String> {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, label)
    }
}

/// Per-call deadline for one unit of work.
///
/// The guard holds only its limit. Every run gets its own timer and its own
/// [`InflightCall`], so one guard (or any copy of it) may run on any number
/// of tasks at once. The timer is dropped with the call on every exit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTimeout {
    limit: Duration,
}

impl ExecutionTimeout {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Run the work built by `work` under the deadline.
    ///
    /// `work` receives a fresh [`InflightCall`] for labelling its sub-calls.
    /// Errors returned by the work pass through untouched. On expiry the work
    /// is dropped and a [`DeadlineExceeded`] naming the innermost labelled
    /// call (or `call` when nothing was labelled) is returned through `E`.
    pub async fn run<T, E, W, F>(&self, call: &str, work: W) -> Result<T, E>
    where
        W: FnOnce(InflightCall) -> F,
        F: Future<Output = Result<T, E>>,
        E: From<DeadlineExceeded>,
    {
        let inflight = InflightCall::default();
        match tokio::time::timeout(self.limit, work(inflight.clone())).await {
            Ok(result) => result,
            Err(_elapsed) => {
                let culprit = inflight.current().unwrap_or_else(|| call.to_string());
                tracing::warn!(
                    event = "deadline.exceeded",
                    call = %culprit,
                    limit_ms = self.limit.as_millis() as u64,
                );
                Err(DeadlineExceeded {
                    call: culprit,
                    limit: self.limit,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_inflight_label_cleared_after_completion() {
        let inflight = InflightCall::default();
        inflight.call("list_networks", async {}).await;
        assert_eq!(inflight.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_labels_restore_outer() {
        let inflight = InflightCall::default();
        let inner = inflight.clone();
        inflight
            .call("outer", async move {
                inner.call("inner", async {}).await;
                assert_eq!(inner.current().as_deref(), Some("outer"));
            })
            .await;
    }

    #[test]
    fn test_message_names_call_and_limit() {
        let e = DeadlineExceeded {
            call: "list_ports".into(),
            limit: Duration::from_secs(2),
        };
        assert!(e.to_string().starts_with("list_ports terminated with the timeout of 2 seconds"));
    }
}
