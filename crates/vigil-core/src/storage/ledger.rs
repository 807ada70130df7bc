//! Row-level queries over the run ledger.
//!
//! Every function takes a plain `&Connection` so it can run on its own or
//! inside an open `Transaction` (which derefs to `Connection`). Readers never
//! write.

use crate::errors::LedgerError;
use crate::model::{
    CheckDefinition, CheckResult, CheckStatus, ResultUpdate, RunStatus, TestRun, TestSet,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

type Result<T> = std::result::Result<T, LedgerError>;

const RUN_COLUMNS: &str = "id, test_set_id, target_id, status, meta_json, started_at, ended_at";
const CHECK_COLUMNS: &str = "id, test_run_id, test_set_id, name, title, description, duration, \
     message, traceback, status, step, time_taken, meta_json";

#[derive(Debug, thiserror::Error)]
#[error("unknown status '{0}'")]
struct UnknownStatus(String);

// --- test sets ---

pub fn upsert_test_set(conn: &Connection, set: &TestSet) -> Result<()> {
    conn.execute(
        "INSERT INTO test_sets(id, description, test_path, driver, additional_arguments_json, cleanup_path, meta_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            description=excluded.description,
            test_path=excluded.test_path,
            driver=excluded.driver,
            additional_arguments_json=excluded.additional_arguments_json,
            cleanup_path=excluded.cleanup_path,
            meta_json=excluded.meta_json",
        params![
            set.id,
            set.description,
            set.test_path,
            set.driver,
            serde_json::to_string(&set.additional_arguments)?,
            set.cleanup_path,
            json_text(&set.meta)?,
        ],
    )?;
    Ok(())
}

/// Replace the definitions of a test set. Existing run records are untouched.
pub fn replace_check_definitions(
    conn: &Connection,
    test_set_id: &str,
    defs: &[CheckDefinition],
) -> Result<()> {
    conn.execute(
        "DELETE FROM check_definitions WHERE test_set_id = ?1",
        params![test_set_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO check_definitions(test_set_id, name, title, description, duration, meta_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for def in defs {
        stmt.execute(params![
            test_set_id,
            def.name,
            def.title,
            def.description,
            def.duration,
            json_text(&def.meta)?,
        ])?;
    }
    Ok(())
}

pub fn get_test_set(conn: &Connection, id: &str) -> Result<Option<TestSet>> {
    let set = conn
        .query_row(
            "SELECT id, description, test_path, driver, additional_arguments_json, cleanup_path, meta_json
             FROM test_sets WHERE id = ?1",
            params![id],
            test_set_from_row,
        )
        .optional()?;
    Ok(set)
}

pub fn list_test_sets(conn: &Connection) -> Result<Vec<TestSet>> {
    let mut stmt = conn.prepare(
        "SELECT id, description, test_path, driver, additional_arguments_json, cleanup_path, meta_json
         FROM test_sets ORDER BY id",
    )?;
    let sets = stmt
        .query_map([], test_set_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(sets)
}

pub fn check_definitions(conn: &Connection, test_set_id: &str) -> Result<Vec<CheckDefinition>> {
    let mut stmt = conn.prepare(
        "SELECT name, title, description, duration, meta_json
         FROM check_definitions WHERE test_set_id = ?1 ORDER BY name",
    )?;
    let defs = stmt
        .query_map(params![test_set_id], |row| {
            Ok(CheckDefinition {
                name: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                duration: row.get(3)?,
                meta: json_column(row, 4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(defs)
}

// --- runs ---

pub fn insert_run(
    conn: &Connection,
    test_set_id: &str,
    target_id: i64,
    meta: &serde_json::Value,
    started_at: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO test_runs(test_set_id, target_id, status, meta_json, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            test_set_id,
            target_id,
            RunStatus::Running.as_str(),
            json_text(meta)?,
            timestamp(started_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_run(conn: &Connection, id: i64, with_checks: bool) -> Result<Option<TestRun>> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM test_runs WHERE id = ?1");
    let run = conn.query_row(&sql, params![id], run_from_row).optional()?;
    match run {
        Some(mut run) if with_checks => {
            run.checks = checks_for_run(conn, run.id)?;
            Ok(Some(run))
        }
        other => Ok(other),
    }
}

/// Most recent run for the pair. Highest id wins; timestamps are not used.
pub fn last_run(conn: &Connection, test_set_id: &str, target_id: i64) -> Result<Option<TestRun>> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM test_runs
         WHERE test_set_id = ?1 AND target_id = ?2
         ORDER BY id DESC LIMIT 1"
    );
    let run = conn
        .query_row(&sql, params![test_set_id, target_id], run_from_row)
        .optional()?;
    Ok(run)
}

/// True when no run exists for the pair or its most recent run is finished.
pub fn is_pair_idle(conn: &Connection, test_set_id: &str, target_id: i64) -> Result<bool> {
    Ok(match last_run(conn, test_set_id, target_id)? {
        Some(run) => run.is_finished(),
        None => true,
    })
}

/// All runs with their checks, most recent first.
pub fn list_runs(conn: &Connection) -> Result<Vec<TestRun>> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM test_runs ORDER BY id DESC");
    collect_runs_with_checks(conn, &sql, params![])
}

pub fn list_runs_for_pair(
    conn: &Connection,
    test_set_id: &str,
    target_id: i64,
) -> Result<Vec<TestRun>> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM test_runs
         WHERE test_set_id = ?1 AND target_id = ?2
         ORDER BY id DESC"
    );
    collect_runs_with_checks(conn, &sql, params![test_set_id, target_id])
}

fn collect_runs_with_checks<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    p: P,
) -> Result<Vec<TestRun>> {
    let mut stmt = conn.prepare(sql)?;
    let mut runs = stmt
        .query_map(p, run_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for run in &mut runs {
        run.checks = checks_for_run(conn, run.id)?;
    }
    Ok(runs)
}

/// Set the run status by id. `finished` stamps `ended_at`; `running` clears it.
pub fn update_run_status(conn: &Connection, run_id: i64, status: RunStatus) -> Result<usize> {
    let ended_at = match status {
        RunStatus::Finished => Some(timestamp(Utc::now())),
        RunStatus::Running => None,
    };
    let n = conn.execute(
        "UPDATE test_runs SET status = ?1, ended_at = ?2 WHERE id = ?3",
        params![status.as_str(), ended_at, run_id],
    )?;
    Ok(n)
}

pub fn delete_run(conn: &Connection, run_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM test_runs WHERE id = ?1", params![run_id])?)
}

// --- check results ---

pub fn insert_check_result(conn: &Connection, check: &CheckResult) -> Result<i64> {
    conn.execute(
        "INSERT INTO check_results(test_run_id, test_set_id, name, title, description, duration,
                                   message, traceback, status, step, time_taken, meta_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            check.test_run_id,
            check.test_set_id,
            check.name,
            check.title,
            check.description,
            check.duration,
            check.message,
            check.traceback,
            check.status.as_str(),
            check.step,
            check.time_taken,
            json_text(&check.meta)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn checks_for_run(conn: &Connection, run_id: i64) -> Result<Vec<CheckResult>> {
    let sql = format!(
        "SELECT {CHECK_COLUMNS} FROM check_results WHERE test_run_id = ?1 ORDER BY name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let checks = stmt
        .query_map(params![run_id], check_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(checks)
}

/// Overwrite the fields present in `update` on the record (run_id, name).
///
/// Returns the number of rows touched; zero when the record does not exist.
pub fn add_result(
    conn: &Connection,
    run_id: i64,
    name: &str,
    update: &ResultUpdate,
) -> Result<usize> {
    let mut columns: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = update.status {
        columns.push("status");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(message) = &update.message {
        columns.push("message");
        values.push(Value::Text(message.clone()));
    }
    if let Some(traceback) = &update.traceback {
        columns.push("traceback");
        values.push(Value::Text(traceback.clone()));
    }
    if let Some(step) = update.step {
        columns.push("step");
        values.push(Value::Integer(step));
    }
    if let Some(taken) = update.time_taken {
        columns.push("time_taken");
        values.push(Value::Real(taken));
    }
    if let Some(duration) = &update.duration {
        columns.push("duration");
        values.push(Value::Text(duration.clone()));
    }
    if let Some(meta) = &update.meta {
        columns.push("meta_json");
        values.push(Value::Text(serde_json::to_string(meta)?));
    }

    if columns.is_empty() {
        return Ok(0);
    }

    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{col} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE check_results SET {assignments} WHERE test_run_id = ?{} AND name = ?{}",
        columns.len() + 1,
        columns.len() + 2
    );
    values.push(Value::Integer(run_id));
    values.push(Value::Text(name.to_string()));

    Ok(conn.execute(&sql, params_from_iter(values))?)
}

/// Move every `running`/`wait_running` record of the run to `status`.
pub fn mark_pending_as(conn: &Connection, run_id: i64, status: CheckStatus) -> Result<usize> {
    let n = conn.execute(
        "UPDATE check_results SET status = ?1
         WHERE test_run_id = ?2 AND status IN ('running', 'wait_running')",
        params![status.as_str(), run_id],
    )?;
    Ok(n)
}

/// Same as [`mark_pending_as`] but also records `message` on each record.
pub fn fail_pending(conn: &Connection, run_id: i64, status: CheckStatus, message: &str) -> Result<usize> {
    let n = conn.execute(
        "UPDATE check_results SET status = ?1, message = ?2
         WHERE test_run_id = ?3 AND status IN ('running', 'wait_running')",
        params![status.as_str(), message, run_id],
    )?;
    Ok(n)
}

/// Move exactly the named records of the run to `status`.
pub fn rearm(conn: &Connection, run_id: i64, names: &[String], status: CheckStatus) -> Result<usize> {
    let mut stmt = conn.prepare(
        "UPDATE check_results SET status = ?1 WHERE test_run_id = ?2 AND name = ?3",
    )?;
    let mut n = 0;
    for name in names {
        n += stmt.execute(params![status.as_str(), run_id, name])?;
    }
    Ok(n)
}

pub fn count_pending(conn: &Connection, run_id: i64) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM check_results
         WHERE test_run_id = ?1 AND status IN ('running', 'wait_running')",
        params![run_id],
        |r| r.get(0),
    )?;
    Ok(n)
}

// --- row mapping ---

fn test_set_from_row(row: &Row<'_>) -> rusqlite::Result<TestSet> {
    let args: String = row.get(4)?;
    let additional_arguments = serde_json::from_str(&args)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(TestSet {
        id: row.get(0)?,
        description: row.get(1)?,
        test_path: row.get(2)?,
        driver: row.get(3)?,
        additional_arguments,
        cleanup_path: row.get(5)?,
        meta: json_column(row, 6)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<TestRun> {
    let status: String = row.get(3)?;
    let status = RunStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(UnknownStatus(status)))
    })?;
    Ok(TestRun {
        id: row.get(0)?,
        test_set_id: row.get(1)?,
        target_id: row.get(2)?,
        status,
        meta: json_column(row, 4)?,
        started_at: timestamp_column(row, 5)?,
        ended_at: match row.get::<_, Option<String>>(6)? {
            Some(_) => Some(timestamp_column(row, 6)?),
            None => None,
        },
        checks: Vec::new(),
    })
}

fn check_from_row(row: &Row<'_>) -> rusqlite::Result<CheckResult> {
    let status: String = row.get(9)?;
    let status = CheckStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(UnknownStatus(status)))
    })?;
    Ok(CheckResult {
        id: row.get(0)?,
        test_run_id: row.get(1)?,
        test_set_id: row.get(2)?,
        name: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        duration: row.get(6)?,
        message: row.get(7)?,
        traceback: row.get(8)?,
        status,
        step: row.get(10)?,
        time_taken: row.get(11)?,
        meta: json_column(row, 12)?,
    })
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        _ => Ok(serde_json::Value::Null),
    }
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_text(v: &serde_json::Value) -> serde_json::Result<Option<String>> {
    if v.is_null() {
        Ok(None)
    } else {
        serde_json::to_string(v).map(Some)
    }
}

pub(crate) fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::DDL;

    fn conn_with_set() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(DDL).unwrap();
        upsert_test_set(
            &conn,
            &TestSet {
                id: "smoke".into(),
                description: "Smoke checks".into(),
                test_path: "checks/smoke".into(),
                driver: "ledger".into(),
                additional_arguments: vec!["--verbose".into()],
                cleanup_path: Some("checks.cleanup".into()),
                meta: serde_json::json!({"tier": 1}),
            },
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_set_roundtrip_through_columns() {
        let conn = conn_with_set();
        let set = get_test_set(&conn, "smoke").unwrap().unwrap();
        assert_eq!(set.additional_arguments, vec!["--verbose".to_string()]);
        assert_eq!(set.cleanup_path.as_deref(), Some("checks.cleanup"));
        assert_eq!(set.meta["tier"], 1);
        assert!(get_test_set(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_ended_at_constraint_rejects_inconsistent_rows() {
        let conn = conn_with_set();
        let err = conn
            .execute(
                "INSERT INTO test_runs(test_set_id, target_id, status, started_at)
                 VALUES ('smoke', 1, 'finished', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("CHECK"));
    }

    #[test]
    fn test_add_result_without_fields_touches_nothing() {
        let conn = conn_with_set();
        let run_id = insert_run(&conn, "smoke", 1, &serde_json::Value::Null, Utc::now()).unwrap();
        assert_eq!(add_result(&conn, run_id, "net", &ResultUpdate::default()).unwrap(), 0);
    }

    #[test]
    fn test_last_run_orders_by_id_not_timestamp() {
        let conn = conn_with_set();
        let later = Utc::now();
        let earlier = later - chrono::Duration::hours(1);
        let first = insert_run(&conn, "smoke", 1, &serde_json::Value::Null, later).unwrap();
        update_run_status(&conn, first, RunStatus::Finished).unwrap();
        let second = insert_run(&conn, "smoke", 1, &serde_json::Value::Null, earlier).unwrap();

        let last = last_run(&conn, "smoke", 1).unwrap().unwrap();
        assert_eq!(last.id, second);
    }
}
