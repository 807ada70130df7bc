use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vigil_core::model::CheckStatus;

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Ledger of health-check runs against deployment targets"
)]
pub struct Cli {
    /// Ledger database (defaults to .vigil/vigil.db)
    #[arg(long, global = true, env = "VIGIL_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the ledger database
    Init,
    /// Load test sets and check definitions from YAML
    Load(LoadArgs),
    /// List test sets
    Sets,
    /// List runs, most recent first
    Runs(RunsArgs),
    Show(RunRef),
    Start(StartArgs),
    Restart(RestartArgs),
    Stop(RunRef),
    /// Record a check outcome reported by a worker
    Result(ResultArgs),
    Finish(RunRef),
    /// Finish the run if no check is pending
    Reconcile(RunRef),
    /// Wait until the run is finished
    Watch(WatchArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct LoadArgs {
    pub path: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunsArgs {
    #[arg(long)]
    pub test_set: Option<String>,

    #[arg(long, requires = "test_set")]
    pub target: Option<i64>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunRef {
    pub run_id: i64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StartArgs {
    #[arg(long)]
    pub test_set: String,

    #[arg(long)]
    pub target: i64,

    /// Run only these checks (repeatable); the rest start disabled
    #[arg(long = "check")]
    pub checks: Vec<String>,

    /// Opaque JSON stored with the run
    #[arg(long)]
    pub meta: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RestartArgs {
    pub run_id: i64,

    /// Checks to re-arm (repeatable); omitted means none
    #[arg(long = "check")]
    pub checks: Vec<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ResultArgs {
    pub run_id: i64,
    pub name: String,

    #[arg(long, value_parser = parse_check_status)]
    pub status: Option<CheckStatus>,

    #[arg(long)]
    pub message: Option<String>,

    #[arg(long)]
    pub traceback: Option<String>,

    #[arg(long)]
    pub step: Option<i64>,

    /// Seconds the check took
    #[arg(long)]
    pub taken: Option<f64>,

    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WatchArgs {
    pub run_id: i64,

    /// Seconds to wait (defaults to VIGIL_BUILD_TIMEOUT_SECS)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Seconds between status checks (defaults to VIGIL_BUILD_INTERVAL_SECS)
    #[arg(long)]
    pub interval: Option<u64>,
}

fn parse_check_status(s: &str) -> Result<CheckStatus, String> {
    CheckStatus::parse(s).ok_or_else(|| format!("unknown check status '{s}'"))
}
