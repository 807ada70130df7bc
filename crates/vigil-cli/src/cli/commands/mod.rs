use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vigil_core::config::VigilConfig;
use vigil_core::runner::{LedgerRunner, RunnerRegistry};
use vigil_core::{RunLifecycle, Store};

use crate::cli::args::{Cli, Command};

pub mod definitions;
pub mod result;
pub mod runs;
pub mod watch;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TIMED_OUT: i32 = 1;
    pub const FATAL: i32 = 2;
    /// The pair already has an active run.
    pub const CONFLICT: i32 = 3;
}

pub async fn dispatch(cli: Cli, cfg: VigilConfig) -> anyhow::Result<i32> {
    let db = cli.db.unwrap_or_else(|| cfg.db_path.clone());
    let store = open_store(&db, &cfg)?;
    tracing::debug!(event = "cli.dispatch", db = %db.display());

    match cli.cmd {
        Command::Init => definitions::init(&db, &store),
        Command::Load(args) => definitions::load(args, &store),
        Command::Sets => definitions::sets(&store),
        Command::Runs(args) => runs::list(args, &store),
        Command::Show(r) => runs::show(r.run_id, &lifecycle(store)),
        Command::Start(args) => runs::start(args, &lifecycle(store)),
        Command::Restart(args) => runs::restart(args, &lifecycle(store)),
        Command::Stop(r) => runs::stop(r.run_id, &lifecycle(store)),
        Command::Finish(r) => runs::finish(r.run_id, &lifecycle(store)),
        Command::Reconcile(r) => runs::reconcile(r.run_id, &lifecycle(store)),
        Command::Result(args) => result::run(args, &lifecycle(store)),
        Command::Watch(args) => watch::run(args, lifecycle(store), &cfg).await,
    }
}

fn open_store(db: &Path, cfg: &VigilConfig) -> anyhow::Result<Store> {
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = Store::open_with_busy_timeout(db, cfg.busy_timeout)
        .with_context(|| format!("failed to open ledger {}", db.display()))?;
    store.init_schema()?;
    Ok(store)
}

fn lifecycle(store: Store) -> RunLifecycle {
    let runners = RunnerRegistry::new().register(LedgerRunner::DRIVER, Arc::new(LedgerRunner));
    RunLifecycle::new(store, runners)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn display_path(p: &Path) -> PathBuf {
    std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}
