//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    marker::Marker,
    step::{Step, StepDefaults},
};
use crate::execution::regression::RegressionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How the agent may treat files matching a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAccess {
    Editable,
    ReadOnly,
    Excluded,
}

/// A glob-style rule describing what the agent may touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAccessRule {
    pub pattern: String,
    pub access: FileAccess,
}

/// A pipeline definition
///
/// Immutable once a run starts.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,

    pub description: String,

    /// Root of the project being healed
    pub target_path: PathBuf,

    /// Iteration cap (0 = unlimited)
    pub max_iterations: usize,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Success criteria in evaluation order
    pub markers: Vec<Marker>,

    pub file_access: Vec<FileAccessRule>,

    /// Free-text context appended to every healing prompt
    pub healing_context: String,

    /// Constants seeded into step data at the start of every iteration
    pub variables: HashMap<String, String>,

    pub regression: RegressionPolicy,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let defaults = StepDefaults {
            timeout_secs: config.default_timeout_secs.unwrap_or(300),
            ..StepDefaults::default()
        };

        Pipeline {
            name: config.name.clone(),
            description: config.description.clone().unwrap_or_default(),
            target_path: PathBuf::from(config.target_path.as_deref().unwrap_or(".")),
            max_iterations: config.max_iterations.unwrap_or(5),
            steps: config
                .steps
                .iter()
                .map(|step_config| Step::from_config(step_config, &defaults))
                .collect(),
            markers: config.markers.clone(),
            file_access: config.file_access.clone(),
            healing_context: config.healing_context.clone().unwrap_or_default(),
            variables: config.variables.clone(),
            regression: config.regression.clone().unwrap_or_default(),
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Whether the iteration cap applies
    pub fn is_bounded(&self) -> bool {
        self.max_iterations > 0
    }

    /// Patterns with the given access level, in declaration order
    pub fn patterns_with(&self, access: FileAccess) -> Vec<&str> {
        self.file_access
            .iter()
            .filter(|rule| rule.access == access)
            .map(|rule| rule.pattern.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_preserves_order() {
        let yaml = r#"
name: "Test Pipeline"
target_path: "/tmp/project"
max_iterations: 3
steps:
  - id: "build"
    name: "Build"
    command: "make"
  - id: "test"
    name: "Test"
    command: "make test"
    timeout_secs: 30
markers:
  - id: "built"
    name: "Build ok"
    kind: exit_code
    source: "build"
    target: "0"
file_access:
  - pattern: "src/**"
    access: editable
  - pattern: "Makefile"
    access: read_only
"#;

        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let pipeline = config.to_pipeline();

        assert_eq!(pipeline.target_path, PathBuf::from("/tmp/project"));
        assert_eq!(pipeline.max_iterations, 3);
        assert!(pipeline.is_bounded());
        assert_eq!(pipeline.steps[0].id, "build");
        assert_eq!(pipeline.steps[0].timeout_secs, 300);
        assert_eq!(pipeline.step("test").unwrap().timeout_secs, 30);
        assert_eq!(pipeline.patterns_with(FileAccess::Editable), vec!["src/**"]);
        assert_eq!(pipeline.patterns_with(FileAccess::ReadOnly), vec!["Makefile"]);
        assert!(pipeline.patterns_with(FileAccess::Excluded).is_empty());
    }

    #[test]
    fn test_zero_iterations_is_unbounded() {
        let yaml = "name: p\nmax_iterations: 0\nsteps: []\n";
        let pipeline = PipelineConfig::from_yaml(yaml).unwrap().to_pipeline();
        assert!(!pipeline.is_bounded());
    }
}
