use crate::definitions::Definitions;
use crate::errors::LedgerError;
use crate::model::{TestRun, TestSet};
use crate::storage::ledger;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Handle on the ledger database. Clones share one connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

pub struct StoreStats {
    pub test_sets: u64,
    pub runs: u64,
    pub active_runs: u64,
    pub last_run_id: Option<i64>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a file-backed ledger. Other processes may hold their own
    /// connections to the same file; writers wait up to `busy_timeout`.
    pub fn open_with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get::<_, String>(0))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> Result<(), LedgerError> {
        let conn = self.lock();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // A panic while holding the lock cannot leave a half-applied write: every
    // write runs in a transaction that rolls back on drop.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run read-only queries on the shared connection.
    pub fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken before `f` reads anything, so check-then-act
    /// sequences cannot interleave with another writer. Commits when `f`
    /// returns `Ok`, rolls back otherwise.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    pub fn get_run(&self, run_id: i64, with_checks: bool) -> Result<Option<TestRun>, LedgerError> {
        self.read(|conn| ledger::get_run(conn, run_id, with_checks))
    }

    pub fn last_run(&self, test_set_id: &str, target_id: i64) -> Result<Option<TestRun>, LedgerError> {
        self.read(|conn| ledger::last_run(conn, test_set_id, target_id))
    }

    pub fn list_runs(&self) -> Result<Vec<TestRun>, LedgerError> {
        self.read(ledger::list_runs)
    }

    pub fn list_runs_for_pair(
        &self,
        test_set_id: &str,
        target_id: i64,
    ) -> Result<Vec<TestRun>, LedgerError> {
        self.read(|conn| ledger::list_runs_for_pair(conn, test_set_id, target_id))
    }

    pub fn get_test_set(&self, id: &str) -> Result<Option<TestSet>, LedgerError> {
        self.read(|conn| ledger::get_test_set(conn, id))
    }

    pub fn list_test_sets(&self) -> Result<Vec<TestSet>, LedgerError> {
        self.read(ledger::list_test_sets)
    }

    /// Upsert every test set in `defs` and replace its check definitions.
    /// Returns the number of check definitions written.
    pub fn load_definitions(&self, defs: &Definitions) -> Result<usize, LedgerError> {
        self.write(|tx| {
            let mut n = 0;
            for entry in &defs.test_sets {
                ledger::upsert_test_set(tx, &entry.test_set)?;
                ledger::replace_check_definitions(tx, &entry.test_set.id, &entry.checks)?;
                n += entry.checks.len();
            }
            tracing::info!(
                event = "definitions.loaded",
                test_sets = defs.test_sets.len(),
                checks = n
            );
            Ok(n)
        })
    }

    /// Delete a run and, by cascade, its check results.
    pub fn delete_run(&self, run_id: i64) -> Result<bool, LedgerError> {
        self.write(|tx| Ok(ledger::delete_run(tx, run_id)? > 0))
    }

    pub fn stats(&self) -> Result<StoreStats, LedgerError> {
        self.read(|conn| {
            let count = |sql: &str| -> Result<u64, LedgerError> {
                Ok(conn.query_row(sql, [], |r| r.get::<_, i64>(0))? as u64)
            };
            Ok(StoreStats {
                test_sets: count("SELECT COUNT(*) FROM test_sets")?,
                runs: count("SELECT COUNT(*) FROM test_runs")?,
                active_runs: count("SELECT COUNT(*) FROM test_runs WHERE status = 'running'")?,
                last_run_id: conn.query_row("SELECT MAX(id) FROM test_runs", [], |r| r.get(0))?,
            })
        })
    }
}
