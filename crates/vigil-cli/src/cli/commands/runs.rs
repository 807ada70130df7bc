use anyhow::Context;
use vigil_core::model::TestRun;
use vigil_core::{LedgerError, RunLifecycle, Store};

use super::{exit_codes, print_json};
use crate::cli::args::{RestartArgs, RunsArgs, StartArgs};

pub fn list(args: RunsArgs, store: &Store) -> anyhow::Result<i32> {
    let runs = match (args.test_set.as_deref(), args.target) {
        (Some(set), Some(target)) => store.list_runs_for_pair(set, target)?,
        (Some(set), None) => store
            .list_runs()?
            .into_iter()
            .filter(|r| r.test_set_id == set)
            .collect(),
        _ => store.list_runs()?,
    };
    let snapshots: Vec<_> = runs.iter().map(TestRun::snapshot).collect();
    print_json(&snapshots)?;
    Ok(exit_codes::OK)
}

pub fn show(run_id: i64, lc: &RunLifecycle) -> anyhow::Result<i32> {
    let snap = lc.snapshot(run_id)?.ok_or(LedgerError::RunNotFound(run_id))?;
    print_json(&snap)?;
    Ok(exit_codes::OK)
}

pub fn start(args: StartArgs, lc: &RunLifecycle) -> anyhow::Result<i32> {
    let meta = match args.meta.as_deref() {
        Some(raw) => serde_json::from_str(raw).context("--meta is not valid JSON")?,
        None => serde_json::Value::Null,
    };
    match lc.start(&args.test_set, args.target, meta, &args.checks)? {
        Some(snap) => {
            print_json(&snap)?;
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!(
                "conflict: test set '{}' already has an active run on target {}",
                args.test_set, args.target
            );
            Ok(exit_codes::CONFLICT)
        }
    }
}

pub fn restart(args: RestartArgs, lc: &RunLifecycle) -> anyhow::Result<i32> {
    match lc.restart(args.run_id, &args.checks)? {
        Some(snap) => {
            print_json(&snap)?;
            Ok(exit_codes::OK)
        }
        None => {
            eprintln!(
                "conflict: run {} cannot restart while its pair has an active run",
                args.run_id
            );
            Ok(exit_codes::CONFLICT)
        }
    }
}

pub fn stop(run_id: i64, lc: &RunLifecycle) -> anyhow::Result<i32> {
    print_json(&lc.stop(run_id)?)?;
    Ok(exit_codes::OK)
}

pub fn finish(run_id: i64, lc: &RunLifecycle) -> anyhow::Result<i32> {
    print_json(&lc.finish(run_id)?)?;
    Ok(exit_codes::OK)
}

pub fn reconcile(run_id: i64, lc: &RunLifecycle) -> anyhow::Result<i32> {
    let finished = lc.reconcile(run_id)?;
    let snap = lc.snapshot(run_id)?.ok_or(LedgerError::RunNotFound(run_id))?;
    print_json(&serde_json::json!({
        "finished_now": finished,
        "run": snap,
    }))?;
    Ok(exit_codes::OK)
}
