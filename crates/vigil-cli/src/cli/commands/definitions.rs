use std::path::Path;
use vigil_core::definitions::load_definitions;
use vigil_core::model::TestSetSummary;
use vigil_core::Store;

use super::{display_path, exit_codes, print_json};
use crate::cli::args::LoadArgs;

pub fn init(db: &Path, store: &Store) -> anyhow::Result<i32> {
    let stats = store.stats()?;
    print_json(&serde_json::json!({
        "db": display_path(db),
        "test_sets": stats.test_sets,
        "runs": stats.runs,
        "active_runs": stats.active_runs,
    }))?;
    Ok(exit_codes::OK)
}

pub fn load(args: LoadArgs, store: &Store) -> anyhow::Result<i32> {
    let defs = load_definitions(&args.path).map_err(|e| anyhow::anyhow!("config error: {}", e))?;
    let checks = store.load_definitions(&defs)?;
    print_json(&serde_json::json!({
        "test_sets": defs.test_sets.len(),
        "checks": checks,
    }))?;
    Ok(exit_codes::OK)
}

pub fn sets(store: &Store) -> anyhow::Result<i32> {
    let sets: Vec<TestSetSummary> = store
        .list_test_sets()?
        .iter()
        .map(|s| s.summary())
        .collect();
    print_json(&sets)?;
    Ok(exit_codes::OK)
}
