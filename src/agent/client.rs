//! Agent client configuration and invocation requests

use std::path::PathBuf;
use std::time::Duration;

/// Capabilities granted to the agent during a healing round
pub const HEALING_TOOLS: &[&str] = &["Read", "Edit", "Write", "Bash", "Grep", "Glob"];

/// Configuration for the agent client
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// Path to the agent executable
    ///
    /// If not provided, defaults to "claude" (assumes it's on PATH).
    pub executable: Option<String>,

    /// Model override passed through to the agent
    pub model: Option<String>,

    /// Turn budget per invocation
    pub max_turns: u32,

    /// Wall-clock budget per invocation in seconds
    pub timeout_secs: u64,

    /// Extra arguments appended to the command line
    pub extra_args: Vec<String>,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            executable: None,
            model: None,
            max_turns: 30,
            timeout_secs: 900,
            extra_args: Vec::new(),
        }
    }
}

impl AgentClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn executable(&self) -> &str {
        self.executable.as_deref().unwrap_or("claude")
    }

    /// Build a request using this configuration's budgets
    pub fn request(&self, prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> AgentRequest {
        AgentRequest {
            prompt: prompt.into(),
            working_dir: working_dir.into(),
            max_turns: self.max_turns,
            timeout: Duration::from_secs(self.timeout_secs),
            allowed_tools: HEALING_TOOLS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// One agent invocation
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
    pub max_turns: u32,
    pub timeout: Duration,
    pub allowed_tools: Vec<String>,
}
