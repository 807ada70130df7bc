use crate::errors::LedgerError;
use crate::model::{TestRun, TestSet};
use std::collections::HashMap;
use std::sync::Arc;

/// Executes the checks of a run outside the ledger (worker process, pool,
/// remote agent) and reports back through `RunLifecycle::add_result`.
///
/// Implementations must not block on check execution inside `run`. The
/// ledger lock is never held while either method is called, so a runner may
/// call back into the ledger synchronously.
pub trait ExternalRunner: Send + Sync {
    /// Begin executing `run`. `enabled_checks` is the subset selected by a
    /// restart; `None` means every non-disabled check of the run.
    fn run(
        &self,
        run: &TestRun,
        test_set: &TestSet,
        enabled_checks: Option<&[String]>,
    ) -> anyhow::Result<()>;

    /// Ask the runner to terminate the run. Returns whether it did.
    fn kill(&self, run_id: i64, target_id: i64, cleanup_path: Option<&str>)
        -> anyhow::Result<bool>;
}

/// Runners keyed by the `driver` of a test set.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<String, Arc<dyn ExternalRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, driver: impl Into<String>, runner: Arc<dyn ExternalRunner>) -> Self {
        self.runners.insert(driver.into(), runner);
        self
    }

    pub fn get(&self, driver: &str) -> Result<Arc<dyn ExternalRunner>, LedgerError> {
        self.runners
            .get(driver)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownDriver(driver.to_string()))
    }

    pub fn drivers(&self) -> Vec<&str> {
        let mut d: Vec<&str> = self.runners.keys().map(String::as_str).collect();
        d.sort_unstable();
        d
    }
}

/// Runner for deployments where workers pull `wait_running` checks from the
/// ledger themselves. Dispatch is only logged; there is nothing local to kill.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerRunner;

impl LedgerRunner {
    pub const DRIVER: &'static str = "ledger";
}

impl ExternalRunner for LedgerRunner {
    fn run(
        &self,
        run: &TestRun,
        test_set: &TestSet,
        enabled_checks: Option<&[String]>,
    ) -> anyhow::Result<()> {
        tracing::info!(
            event = "runner.dispatched",
            driver = Self::DRIVER,
            run_id = run.id,
            test_set = %test_set.id,
            target_id = run.target_id,
            subset = ?enabled_checks,
        );
        Ok(())
    }

    fn kill(&self, run_id: i64, target_id: i64, cleanup_path: Option<&str>) -> anyhow::Result<bool> {
        tracing::info!(
            event = "runner.killed",
            driver = Self::DRIVER,
            run_id,
            target_id,
            cleanup = cleanup_path.unwrap_or("none"),
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_driver_is_an_error() {
        let registry = RunnerRegistry::new().register(LedgerRunner::DRIVER, Arc::new(LedgerRunner));
        assert!(registry.get("ledger").is_ok());
        assert!(matches!(
            registry.get("nose"),
            Err(LedgerError::UnknownDriver(d)) if d == "nose"
        ));
        assert_eq!(registry.drivers(), vec!["ledger"]);
    }
}
