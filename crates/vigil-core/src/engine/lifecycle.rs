use crate::errors::LedgerError;
use crate::model::{
    CheckResult, CheckStatus, ResultUpdate, RunSnapshot, RunStatus, TestRun, TestSet,
};
use crate::runner::{ExternalRunner, RunnerRegistry};
use crate::storage::ledger;
use crate::storage::store::Store;
use std::sync::Arc;

/// The run lifecycle: start, restart, stop and finish runs of a test set
/// against a target, keeping at most one `running` run per pair.
///
/// Refusals (the pair already has an active run) are `Ok(None)`, not
/// errors. Storage and runner failures propagate after rollback.
#[derive(Clone)]
pub struct RunLifecycle {
    store: Store,
    runners: RunnerRegistry,
}

impl RunLifecycle {
    pub fn new(store: Store, runners: RunnerRegistry) -> Self {
        Self { store, runners }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// True when the pair has no run yet or its most recent run is finished.
    /// Always read fresh; runners finish runs behind our back.
    pub fn is_pair_idle(&self, test_set_id: &str, target_id: i64) -> Result<bool, LedgerError> {
        self.store
            .read(|conn| ledger::is_pair_idle(conn, test_set_id, target_id))
    }

    pub fn start(
        &self,
        test_set_id: &str,
        target_id: i64,
        meta: serde_json::Value,
        enabled_checks: &[String],
    ) -> Result<Option<RunSnapshot>, LedgerError> {
        let test_set = self.test_set(test_set_id)?;
        let runner = self.runners.get(&test_set.driver)?;

        let created = self.store.write(|tx| {
            if !ledger::is_pair_idle(tx, &test_set.id, target_id)? {
                return Ok(None);
            }
            let run_id =
                match ledger::insert_run(tx, &test_set.id, target_id, &meta, chrono::Utc::now()) {
                    Ok(id) => id,
                    Err(e) if e.is_unique_violation() => return Ok(None),
                    Err(e) => return Err(e),
                };
            for def in ledger::check_definitions(tx, &test_set.id)? {
                let check = CheckResult::from_definition(&def, &test_set.id, run_id, enabled_checks);
                ledger::insert_check_result(tx, &check)?;
            }
            Ok(Some(run_id))
        })?;

        let Some(run_id) = created else {
            tracing::info!(
                event = "run.refused",
                op = "start",
                test_set = %test_set.id,
                target_id,
                "pair already has an active run"
            );
            return Ok(None);
        };

        let run = self.load(run_id)?;
        tracing::info!(
            event = "run.started",
            run_id,
            test_set = %test_set.id,
            target_id,
            checks = run.checks.len(),
            enabled = run.enabled_checks().len(),
        );
        self.dispatch(&runner, &run, &test_set, None)?;

        Ok(Some(self.load(run_id)?.snapshot()))
    }

    /// Put a finished run back to `running`, re-arming exactly the named
    /// checks (all others keep their status).
    ///
    /// Refused unless the most recent run of this run's pair is finished.
    pub fn restart(
        &self,
        run_id: i64,
        enabled_checks: &[String],
    ) -> Result<Option<RunSnapshot>, LedgerError> {
        let run = self
            .store
            .get_run(run_id, false)?
            .ok_or(LedgerError::RunNotFound(run_id))?;
        let test_set = self.test_set(&run.test_set_id)?;
        let runner = self.runners.get(&test_set.driver)?;

        let restarted = self.store.write(|tx| {
            if !ledger::is_pair_idle(tx, &run.test_set_id, run.target_id)? {
                return Ok(false);
            }
            match ledger::update_run_status(tx, run_id, RunStatus::Running) {
                Ok(_) => {}
                Err(e) if e.is_unique_violation() => return Ok(false),
                Err(e) => return Err(e),
            }
            if !enabled_checks.is_empty() {
                ledger::rearm(tx, run_id, enabled_checks, CheckStatus::WaitRunning)?;
            }
            Ok(true)
        })?;

        if !restarted {
            tracing::info!(
                event = "run.refused",
                op = "restart",
                run_id,
                test_set = %run.test_set_id,
                target_id = run.target_id,
                "pair already has an active run"
            );
            return Ok(None);
        }

        let run = self.load(run_id)?;
        tracing::info!(
            event = "run.restarted",
            run_id,
            test_set = %run.test_set_id,
            target_id = run.target_id,
            rearmed = enabled_checks.len(),
        );
        let subset = (!enabled_checks.is_empty()).then_some(enabled_checks);
        self.dispatch(&runner, &run, &test_set, subset)?;

        Ok(Some(self.load(run_id)?.snapshot()))
    }

    /// Ask the runner to terminate the run; if it confirms, every pending
    /// check becomes `stopped`. The run status itself is left alone.
    pub fn stop(&self, run_id: i64) -> Result<RunSnapshot, LedgerError> {
        let run = self
            .store
            .get_run(run_id, false)?
            .ok_or(LedgerError::RunNotFound(run_id))?;
        let test_set = self.test_set(&run.test_set_id)?;
        let runner = self.runners.get(&test_set.driver)?;

        let killed = runner
            .kill(run.id, run.target_id, test_set.cleanup_path.as_deref())
            .map_err(LedgerError::Runner)?;

        if killed {
            let stopped = self
                .store
                .write(|tx| ledger::mark_pending_as(tx, run_id, CheckStatus::Stopped))?;
            tracing::info!(event = "run.stopped", run_id, stopped);
        } else {
            tracing::warn!(
                event = "run.stop_unconfirmed",
                run_id,
                driver = %test_set.driver,
                "runner did not confirm termination; checks left as they are"
            );
        }

        Ok(self.load(run_id)?.snapshot())
    }

    /// Set the run-level status. Checks are not touched.
    pub fn update(&self, run_id: i64, status: RunStatus) -> Result<RunSnapshot, LedgerError> {
        let n = self
            .store
            .write(|tx| ledger::update_run_status(tx, run_id, status))?;
        if n == 0 {
            return Err(LedgerError::RunNotFound(run_id));
        }
        if status == RunStatus::Finished {
            tracing::info!(event = "run.finished", run_id);
        }
        Ok(self.load(run_id)?.snapshot())
    }

    pub fn finish(&self, run_id: i64) -> Result<RunSnapshot, LedgerError> {
        self.update(run_id, RunStatus::Finished)
    }

    /// Finish the run once none of its checks is pending any more.
    /// Returns whether this call made the transition.
    pub fn reconcile(&self, run_id: i64) -> Result<bool, LedgerError> {
        let finished = self.store.write(|tx| {
            let run = ledger::get_run(tx, run_id, false)?.ok_or(LedgerError::RunNotFound(run_id))?;
            if run.is_finished() || ledger::count_pending(tx, run_id)? > 0 {
                return Ok(false);
            }
            ledger::update_run_status(tx, run_id, RunStatus::Finished)?;
            Ok(true)
        })?;
        if finished {
            tracing::info!(event = "run.finished", run_id, via = "reconcile");
        }
        Ok(finished)
    }

    /// Record a runner-reported outcome. Unknown (run, check) pairs are
    /// ignored and yield 0.
    pub fn add_result(
        &self,
        run_id: i64,
        name: &str,
        update: &ResultUpdate,
    ) -> Result<usize, LedgerError> {
        let n = self
            .store
            .write(|tx| ledger::add_result(tx, run_id, name, update))?;
        if n == 0 {
            tracing::debug!(event = "result.ignored", run_id, check = name);
        }
        Ok(n)
    }

    pub fn snapshot(&self, run_id: i64) -> Result<Option<RunSnapshot>, LedgerError> {
        Ok(self.store.get_run(run_id, true)?.map(|r| r.snapshot()))
    }

    pub fn history(&self) -> Result<Vec<RunSnapshot>, LedgerError> {
        Ok(self.store.list_runs()?.iter().map(TestRun::snapshot).collect())
    }

    fn test_set(&self, id: &str) -> Result<TestSet, LedgerError> {
        self.store
            .get_test_set(id)?
            .ok_or_else(|| LedgerError::TestSetNotFound(id.to_string()))
    }

    fn load(&self, run_id: i64) -> Result<TestRun, LedgerError> {
        self.store
            .get_run(run_id, true)?
            .ok_or(LedgerError::RunNotFound(run_id))
    }

    // Called after commit and without the store lock. A run nobody executes
    // would block its pair forever, so a failed dispatch finishes the run and
    // marks its pending checks as errored before the failure propagates. If
    // that write fails too, the returned error says the pair is still blocked.
    fn dispatch(
        &self,
        runner: &Arc<dyn ExternalRunner>,
        run: &TestRun,
        test_set: &TestSet,
        subset: Option<&[String]>,
    ) -> Result<(), LedgerError> {
        let Err(err) = runner.run(run, test_set, subset) else {
            return Ok(());
        };

        let message = format!("dispatch failed: {err:#}");
        tracing::error!(
            event = "runner.dispatch_failed",
            run_id = run.id,
            driver = %test_set.driver,
            error = %message,
        );
        let compensated = self.store.write(|tx| {
            ledger::fail_pending(tx, run.id, CheckStatus::Error, &message)?;
            ledger::update_run_status(tx, run.id, RunStatus::Finished)
        });
        if let Err(e) = compensated {
            tracing::error!(event = "run.compensation_failed", run_id = run.id, error = %e);
            return Err(LedgerError::Runner(err.context(format!(
                "run {} is still running and blocks its pair until finished ({e})",
                run.id
            ))));
        }
        Err(LedgerError::Runner(err))
    }
}
