#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use vigil_core::definitions::parse_definitions;
use vigil_core::model::{TestRun, TestSet};
use vigil_core::runner::{ExternalRunner, RunnerRegistry};
use vigil_core::{RunLifecycle, Store};

pub const SMOKE_DEFS: &str = r#"
test_sets:
  - id: smoke
    description: Smoke checks
    test_path: checks/smoke
    driver: recording
    cleanup_path: checks.cleanup
    checks:
      - name: net
        title: Network is reachable
      - name: disk
        title: Disk has space
"#;

/// Remembers every dispatch and kill; can be told to fail or refuse.
pub struct RecordingRunner {
    pub dispatched: Mutex<Vec<(i64, Option<Vec<String>>)>>,
    pub killed: Mutex<Vec<(i64, i64, Option<String>)>>,
    pub confirm_kill: AtomicBool,
    pub fail_dispatch: AtomicBool,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dispatched: Mutex::new(Vec::new()),
            killed: Mutex::new(Vec::new()),
            confirm_kill: AtomicBool::new(true),
            fail_dispatch: AtomicBool::new(false),
        })
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }
}

impl ExternalRunner for RecordingRunner {
    fn run(
        &self,
        run: &TestRun,
        _test_set: &TestSet,
        enabled_checks: Option<&[String]>,
    ) -> anyhow::Result<()> {
        if self.fail_dispatch.load(Ordering::SeqCst) {
            anyhow::bail!("worker pool unavailable");
        }
        self.dispatched
            .lock()
            .unwrap()
            .push((run.id, enabled_checks.map(|c| c.to_vec())));
        Ok(())
    }

    fn kill(&self, run_id: i64, target_id: i64, cleanup_path: Option<&str>) -> anyhow::Result<bool> {
        self.killed
            .lock()
            .unwrap()
            .push((run_id, target_id, cleanup_path.map(String::from)));
        Ok(self.confirm_kill.load(Ordering::SeqCst))
    }
}

pub fn seeded_store() -> Store {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    store
        .load_definitions(&parse_definitions(SMOKE_DEFS).unwrap())
        .unwrap();
    store
}

pub fn lifecycle_with(store: Store, runner: Arc<dyn ExternalRunner>) -> RunLifecycle {
    RunLifecycle::new(store, RunnerRegistry::new().register("recording", runner))
}

pub fn smoke_lifecycle(runner: Arc<RecordingRunner>) -> RunLifecycle {
    lifecycle_with(seeded_store(), runner)
}
