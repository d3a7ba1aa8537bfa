//! Agent response types

use crate::agent::cost::UsageReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types for agent operations
///
/// Timeouts and nonzero exits are not errors; they are reported on
/// [`AgentResponse`].
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn agent '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent invocation cancelled")]
    Cancelled,
}

/// A file the agent touched through an edit/write-style tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub tool: String,
    pub path: Option<String>,
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", self.tool, path),
            None => f.write_str(&self.tool),
        }
    }
}

/// Response from the agent
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    /// Aggregated assistant text, or the final result text when none was seen
    pub content: String,

    pub changed_files: Vec<FileChange>,

    /// The invocation hit its wall-clock budget; `content` is partial
    pub timed_out: bool,

    /// Process exit code, absent when killed
    pub exit_code: Option<i32>,

    /// Usage from the final result event, if one arrived
    pub usage: Option<UsageReport>,
}

impl AgentResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_response_creation() {
        let response = AgentResponse::new("Hello, world!");
        assert_eq!(response.content, "Hello, world!");
        assert!(response.succeeded());
        assert!(response.usage.is_none());
    }

    #[test]
    fn test_timed_out_response_is_not_success() {
        let response = AgentResponse {
            timed_out: true,
            exit_code: None,
            ..Default::default()
        };
        assert!(!response.succeeded());
    }

    #[test]
    fn test_file_change_display() {
        let change = FileChange {
            tool: "Edit".to_string(),
            path: Some("src/main.rs".to_string()),
        };
        assert_eq!(change.to_string(), "Edit: src/main.rs");

        let pathless = FileChange {
            tool: "Write".to_string(),
            path: None,
        };
        assert_eq!(pathless.to_string(), "Write");
    }
}
