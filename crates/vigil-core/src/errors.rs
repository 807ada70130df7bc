use thiserror::Error;

/// Failures surfaced by the ledger and the run lifecycle.
///
/// A start/restart that would violate the one-active-run-per-pair rule is not
/// an error; those operations return `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("test run {0} not found")]
    RunNotFound(i64),

    #[error("test set '{0}' not found")]
    TestSetNotFound(String),

    #[error("no runner registered for driver '{0}'")]
    UnknownDriver(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to (de)serialize stored JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("runner failure: {0:#}")]
    Runner(anyhow::Error),
}

impl LedgerError {
    /// True when the underlying SQLite error is a UNIQUE constraint violation.
    ///
    /// The partial index on active runs turns a lost start/restart race into
    /// exactly this error.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            LedgerError::Storage(rusqlite::Error::SqliteFailure(err, _)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_detection() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(LedgerError::from(err).is_unique_violation());

        let other = LedgerError::RunNotFound(1);
        assert!(!other.is_unique_violation());
    }

    #[test]
    fn test_messages_name_the_subject() {
        assert_eq!(LedgerError::RunNotFound(7).to_string(), "test run 7 not found");
        assert_eq!(
            LedgerError::TestSetNotFound("smoke".into()).to_string(),
            "test set 'smoke' not found"
        );
    }
}
