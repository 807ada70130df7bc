use std::time::Duration;
use vigil_core::config::VigilConfig;
use vigil_core::model::RunStatus;
use vigil_core::wait::{wait_for_status, WaitError};
use vigil_core::{LedgerError, RunLifecycle};

use super::{exit_codes, print_json};
use crate::cli::args::WatchArgs;

/// Poll the run until it is finished, reconciling on every poll so a run
/// whose checks have all reported is closed without a separate `finish`.
pub async fn run(args: WatchArgs, lc: RunLifecycle, cfg: &VigilConfig) -> anyhow::Result<i32> {
    let run_id = args.run_id;
    let timeout = args.timeout.map(Duration::from_secs).unwrap_or(cfg.build_timeout);
    let interval = args.interval.map(Duration::from_secs).unwrap_or(cfg.build_interval);

    let outcome = wait_for_status(
        &format!("test run {run_id}"),
        || {
            let lc = lc.clone();
            async move {
                // rusqlite blocks; keep it off the runtime workers
                let status = tokio::task::spawn_blocking(move || settle(&lc, run_id)).await??;
                Ok::<_, anyhow::Error>(status)
            }
        },
        &RunStatus::Finished,
        timeout,
        interval,
    )
    .await;

    let code = match outcome {
        Ok(()) => exit_codes::OK,
        Err(e @ WaitError::TimedOut { .. }) => {
            eprintln!("{e}");
            exit_codes::TIMED_OUT
        }
        Err(e) => return Err(e.into()),
    };

    let snap = lc.snapshot(run_id)?.ok_or(LedgerError::RunNotFound(run_id))?;
    print_json(&snap)?;
    Ok(code)
}

fn settle(lc: &RunLifecycle, run_id: i64) -> anyhow::Result<RunStatus> {
    lc.reconcile(run_id)?;
    let snap = lc.snapshot(run_id)?.ok_or(LedgerError::RunNotFound(run_id))?;
    Ok(snap.status)
}
