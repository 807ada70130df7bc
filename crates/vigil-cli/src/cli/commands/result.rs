use vigil_core::model::ResultUpdate;
use vigil_core::RunLifecycle;

use super::{exit_codes, print_json};
use crate::cli::args::ResultArgs;

pub fn run(args: ResultArgs, lc: &RunLifecycle) -> anyhow::Result<i32> {
    let update = ResultUpdate {
        status: args.status,
        message: args.message,
        traceback: args.traceback,
        step: args.step,
        time_taken: args.taken,
        duration: args.duration,
        meta: None,
    };
    if update.is_empty() {
        anyhow::bail!("nothing to record: pass at least one of --status, --message, --traceback, --step, --taken or --duration");
    }

    let updated = lc.add_result(args.run_id, &args.name, &update)?;
    if updated == 0 {
        eprintln!(
            "warning: run {} has no check named '{}'; nothing recorded",
            args.run_id, args.name
        );
    }
    print_json(&serde_json::json!({ "updated": updated }))?;
    Ok(exit_codes::OK)
}
