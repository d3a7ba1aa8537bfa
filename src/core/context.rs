//! Step data - the per-iteration key/value store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix of the keys under which exit codes are recorded
pub const EXIT_CODE_PREFIX: &str = "exitcode:";

/// Key/value store populated by step outputs and exit codes
///
/// Scoped to a single iteration. Later writes overwrite earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    values: HashMap<String, String>,
}

impl StepData {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with pipeline variables
    pub fn with_variables(variables: &HashMap<String, String>) -> Self {
        Self {
            values: variables.clone(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Record the exit code captured for `key`
    pub fn set_exit_code(&mut self, key: &str, code: i32) {
        self.values.insert(exit_code_key(key), code.to_string());
    }

    /// Exit code recorded for `key`, as stored text
    pub fn exit_code(&self, key: &str) -> Option<&str> {
        self.get(&exit_code_key(key))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }
}

/// Derived key holding the exit code of the step whose output key is `key`
pub fn exit_code_key(key: &str) -> String {
    format!("{}{}", EXIT_CODE_PREFIX, key)
}
