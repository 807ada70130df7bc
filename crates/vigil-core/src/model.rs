use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "finished" => Some(RunStatus::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    WaitRunning,
    Running,
    Failure,
    Success,
    Error,
    Stopped,
    Disabled,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::WaitRunning => "wait_running",
            CheckStatus::Running => "running",
            CheckStatus::Failure => "failure",
            CheckStatus::Success => "success",
            CheckStatus::Error => "error",
            CheckStatus::Stopped => "stopped",
            CheckStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wait_running" => Some(CheckStatus::WaitRunning),
            "running" => Some(CheckStatus::Running),
            "failure" => Some(CheckStatus::Failure),
            "success" => Some(CheckStatus::Success),
            "error" => Some(CheckStatus::Error),
            "stopped" => Some(CheckStatus::Stopped),
            "disabled" => Some(CheckStatus::Disabled),
            _ => None,
        }
    }

    /// Queued or executing; the statuses `stop` is allowed to overwrite.
    pub fn is_pending(&self) -> bool {
        matches!(self, CheckStatus::WaitRunning | CheckStatus::Running)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable definition of a suite of checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSet {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_path: String,
    pub driver: String,
    #[serde(default)]
    pub additional_arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_path: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl TestSet {
    pub fn summary(&self) -> TestSetSummary {
        TestSetSummary {
            id: self.id.clone(),
            name: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSetSummary {
    pub id: String,
    pub name: String,
}

/// Template row for one check in a test set. Never bound to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// Outcome of one check within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Row id; zero until persisted.
    pub id: i64,
    pub test_run_id: i64,
    pub test_set_id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub duration: Option<String>,
    pub message: Option<String>,
    pub traceback: Option<String>,
    pub status: CheckStatus,
    pub step: Option<i64>,
    pub time_taken: Option<f64>,
    pub meta: serde_json::Value,
}

impl CheckResult {
    /// Clone a definition into a fresh record for `test_run_id`.
    ///
    /// With a non-empty `enabled`, names outside it start `disabled`.
    pub fn from_definition(
        def: &CheckDefinition,
        test_set_id: &str,
        test_run_id: i64,
        enabled: &[String],
    ) -> Self {
        let status = if !enabled.is_empty() && !enabled.iter().any(|n| n == &def.name) {
            CheckStatus::Disabled
        } else {
            CheckStatus::WaitRunning
        };

        Self {
            id: 0,
            test_run_id,
            test_set_id: test_set_id.to_string(),
            name: def.name.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            duration: def.duration.clone(),
            message: None,
            traceback: None,
            status,
            step: None,
            time_taken: None,
            meta: def.meta.clone(),
        }
    }

    pub fn snapshot(&self) -> CheckSnapshot {
        CheckSnapshot {
            id: self.name.clone(),
            test_set: self.test_set_id.clone(),
            name: self.title.clone(),
            description: self.description.clone(),
            duration: self.duration.clone(),
            message: self.message.clone(),
            step: self.step,
            status: self.status,
            taken: self.time_taken,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub id: i64,
    pub test_set_id: String,
    pub target_id: i64,
    pub status: RunStatus,
    pub meta: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Ordered by name. Empty when loaded without checks.
    pub checks: Vec<CheckResult>,
}

impl TestRun {
    pub fn is_finished(&self) -> bool {
        self.status == RunStatus::Finished
    }

    /// Names of the checks this run will execute.
    pub fn enabled_checks(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.status != CheckStatus::Disabled)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id,
            test_set: self.test_set_id.clone(),
            meta: self.meta.clone(),
            target_id: self.target_id,
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            tests: self.checks.iter().map(CheckResult::snapshot).collect(),
        }
    }
}

/// Adapter-facing view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: i64,
    pub test_set: String,
    pub meta: serde_json::Value,
    pub target_id: i64,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tests: Vec<CheckSnapshot>,
}

/// Adapter-facing view of a check result. `id` is the check name and
/// `name` its human title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSnapshot {
    pub id: String,
    pub test_set: String,
    pub name: String,
    pub description: String,
    pub duration: Option<String>,
    pub message: Option<String>,
    pub step: Option<i64>,
    pub status: CheckStatus,
    pub taken: Option<f64>,
}

/// Fields reported by the runner for one check. Only `Some` fields are
/// written; each one fully replaces the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ResultUpdate {
    pub fn status(status: CheckStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
