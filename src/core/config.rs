//! Pipeline configuration from YAML

use crate::core::{
    marker::{Marker, MarkerKind},
    pipeline::FileAccessRule,
    step::{FailBehavior, StepKind},
    Pipeline,
};
use crate::execution::regression::RegressionPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Root of the project being healed
    #[serde(default)]
    pub target_path: Option<String>,

    /// Iteration cap (0 = unlimited, default 5)
    #[serde(default)]
    pub max_iterations: Option<usize>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Constants available to `{{key}}` placeholders
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: HashMap<String, String>,

    /// Pipeline steps
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub markers: Vec<Marker>,

    #[serde(default)]
    pub file_access: Vec<FileAccessRule>,

    #[serde(default)]
    pub healing_context: Option<String>,

    /// Agent invocation settings
    #[serde(default)]
    pub agent: Option<AgentSettings>,

    #[serde(default)]
    pub regression: Option<RegressionPolicy>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name
    pub name: String,

    #[serde(default)]
    pub kind: StepKind,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    /// File read by Extract steps
    #[serde(default)]
    pub file_path: Option<String>,

    #[serde(default)]
    pub extract_pattern: Option<String>,

    #[serde(default)]
    pub output_key: Option<String>,

    /// Timeout for this step (overrides global)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub on_failure: Option<FailBehavior>,
}

/// Agent settings that may be given in the pipeline file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub executable: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub max_turns: Option<u32>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Accept scalar YAML values of any type and keep their text
fn deserialize_variables<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, Value> = HashMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => serde_yaml::to_string(&other)
                    .unwrap_or_default()
                    .trim_end()
                    .to_string(),
            };
            (key, text)
        })
        .collect())
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(&step.id) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }
            if step.name.trim().is_empty() {
                anyhow::bail!("Step '{}' has an empty name", step.id);
            }

            let has_command = step.command.as_deref().is_some_and(|c| !c.trim().is_empty());
            match step.kind {
                StepKind::Extract => {
                    if !has_command && step.file_path.is_none() {
                        anyhow::bail!(
                            "Extract step '{}' needs either a file_path or a command",
                            step.id
                        );
                    }
                }
                StepKind::Execute | StepKind::Validate => {
                    if !has_command {
                        anyhow::bail!("Step '{}' has no command", step.id);
                    }
                }
            }

            if let Some(pattern) = &step.extract_pattern {
                if let Err(e) = regex::Regex::new(pattern) {
                    anyhow::bail!("Step '{}' has an invalid extract_pattern: {}", step.id, e);
                }
            }
        }

        let mut seen_markers = HashSet::new();
        for marker in &self.markers {
            if !seen_markers.insert(&marker.id) {
                anyhow::bail!("Duplicate marker ID: {}", marker.id);
            }
            if marker.name.trim().is_empty() {
                anyhow::bail!("Marker '{}' has an empty name", marker.id);
            }

            if matches!(marker.kind, MarkerKind::JsonPath | MarkerKind::Regex) {
                let Some((key, rest)) = marker.keyed_source() else {
                    anyhow::bail!(
                        "Marker '{}' source must look like '<dataKey>:<expression>', got '{}'",
                        marker.id,
                        marker.source
                    );
                };
                if key.is_empty() || rest.is_empty() {
                    anyhow::bail!(
                        "Marker '{}' source must look like '<dataKey>:<expression>', got '{}'",
                        marker.id,
                        marker.source
                    );
                }
                if marker.kind == MarkerKind::Regex {
                    if let Err(e) = regex::Regex::new(rest) {
                        anyhow::bail!("Marker '{}' has an invalid pattern: {}", marker.id, e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
