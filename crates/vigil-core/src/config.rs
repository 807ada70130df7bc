use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from `VIGIL_*` environment variables.
#[derive(Clone, Debug, PartialEq)]
pub struct VigilConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// Budget for waiting on a remote resource to reach a status.
    pub build_timeout: Duration,
    /// Pause between status fetches.
    pub build_interval: Duration,
    pub busy_timeout: Duration,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".vigil/vigil.db"),
            log_level: "info".to_string(),
            build_timeout: Duration::from_secs(300),
            build_interval: Duration::from_secs(3),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

impl VigilConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("VIGIL_DB") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VIGIL_LOG") {
            cfg.log_level = v;
        }
        if let Some(n) = lookup("VIGIL_BUILD_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            cfg.build_timeout = Duration::from_secs(n);
        }
        if let Some(n) = lookup("VIGIL_BUILD_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            cfg.build_interval = Duration::from_secs(n);
        }
        if let Some(n) = lookup("VIGIL_BUSY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            cfg.busy_timeout = Duration::from_millis(n);
        }
        cfg
    }
}
