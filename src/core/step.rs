//! Step domain model

use crate::core::config::StepConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a step does with its command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Run the command and record exit code and output
    #[default]
    Execute,
    /// Read a file or run a command, optionally narrowing the output with a pattern
    Extract,
    /// Run the command purely for its pass/fail signal
    Validate,
}

/// What happens to the rest of the iteration when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailBehavior {
    /// Keep running the remaining steps
    #[default]
    Continue,
    /// Skip the remaining steps of this iteration
    Abort,
}

/// A single step in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Human-readable name
    pub name: String,

    pub kind: StepKind,

    /// Command template, may contain `{{key}}` placeholders
    pub command: String,

    /// Working directory override (defaults to the pipeline target path)
    pub working_dir: Option<PathBuf>,

    /// File read by Extract steps instead of running a command
    pub file_path: Option<String>,

    /// Regex applied to the captured output of Extract steps
    pub extract_pattern: Option<String>,

    /// Name under which output is stored in step data (empty = not stored)
    pub output_key: String,

    /// Timeout in seconds
    pub timeout_secs: u64,

    pub on_failure: FailBehavior,
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        Step {
            id: config.id.clone(),
            name: config.name.clone(),
            kind: config.kind,
            command: config.command.clone().unwrap_or_default(),
            working_dir: config.working_dir.as_ref().map(PathBuf::from),
            file_path: config.file_path.clone(),
            extract_pattern: config.extract_pattern.clone(),
            output_key: config.output_key.clone().unwrap_or_default(),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            on_failure: config.on_failure.unwrap_or(defaults.on_failure),
        }
    }

    /// Whether a failure of this step ends the iteration's step loop
    pub fn aborts_on_failure(&self) -> bool {
        self.on_failure == FailBehavior::Abort
    }
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
    pub on_failure: FailBehavior,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 300, // 5 minutes
            on_failure: FailBehavior::Continue,
        }
    }
}
