pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS test_sets (
  id TEXT PRIMARY KEY,
  description TEXT NOT NULL DEFAULT '',
  test_path TEXT NOT NULL DEFAULT '',
  driver TEXT NOT NULL,
  additional_arguments_json TEXT NOT NULL DEFAULT '[]',
  cleanup_path TEXT,
  meta_json TEXT
);

CREATE TABLE IF NOT EXISTS check_definitions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  test_set_id TEXT NOT NULL REFERENCES test_sets(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  title TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  duration TEXT,
  meta_json TEXT,
  UNIQUE (test_set_id, name)
);

CREATE TABLE IF NOT EXISTS test_runs (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  test_set_id TEXT NOT NULL REFERENCES test_sets(id),
  target_id INTEGER NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('running', 'finished')),
  meta_json TEXT,
  started_at TEXT NOT NULL,
  ended_at TEXT,
  CHECK ((status = 'finished') = (ended_at IS NOT NULL))
);

-- At most one active run per (test set, target).
CREATE UNIQUE INDEX IF NOT EXISTS idx_test_runs_active_pair
  ON test_runs(test_set_id, target_id) WHERE status = 'running';

CREATE INDEX IF NOT EXISTS idx_test_runs_pair
  ON test_runs(test_set_id, target_id, id);

CREATE TABLE IF NOT EXISTS check_results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  test_run_id INTEGER NOT NULL REFERENCES test_runs(id) ON DELETE CASCADE,
  test_set_id TEXT NOT NULL,
  name TEXT NOT NULL,
  title TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  duration TEXT,
  message TEXT,
  traceback TEXT,
  status TEXT NOT NULL CHECK (status IN (
    'wait_running', 'running', 'failure', 'success', 'error', 'stopped', 'disabled'
  )),
  step INTEGER,
  time_taken REAL,
  meta_json TEXT,
  UNIQUE (test_run_id, name)
);
"#;
