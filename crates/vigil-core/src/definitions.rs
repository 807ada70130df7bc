use crate::errors::ConfigError;
use crate::model::{CheckDefinition, TestSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Test sets and their check templates, as read from a definition file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub test_sets: Vec<TestSetDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSetDefinition {
    #[serde(flatten)]
    pub test_set: TestSet,
    #[serde(default)]
    pub checks: Vec<CheckDefinition>,
}

pub fn load_definitions(path: &Path) -> Result<Definitions, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConfigError(format!(
            "failed to read definitions {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_definitions(&raw)
        .map_err(|e| ConfigError(format!("{} (file: {})", e, path.display())))
}

pub fn parse_definitions(raw: &str) -> Result<Definitions, ConfigError> {
    let defs: Definitions = serde_yaml::from_str(raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let mut set_ids = HashSet::new();
    for entry in &defs.test_sets {
        let id = &entry.test_set.id;
        if id.trim().is_empty() {
            return Err(ConfigError("test set with empty id".into()));
        }
        if !set_ids.insert(id.as_str()) {
            return Err(ConfigError(format!("duplicate test set '{}'", id)));
        }
        if entry.test_set.driver.trim().is_empty() {
            return Err(ConfigError(format!("test set '{}' has no driver", id)));
        }

        let mut names = HashSet::new();
        for check in &entry.checks {
            if !names.insert(check.name.as_str()) {
                return Err(ConfigError(format!(
                    "duplicate check '{}' in test set '{}'",
                    check.name, id
                )));
            }
        }
    }

    Ok(defs)
}
