//! Run state models - iterations, sessions and the agent transcript

use crate::core::marker::MarkerResult;
use crate::core::step::StepKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is in progress (possibly paused)
    Running,
    /// Every marker passed
    Succeeded,
    /// Iteration budget exhausted or the run faulted
    Failed,
    /// Cancelled, or stopped because results were regressing
    Aborted,
}

impl RunStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Result of running one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub name: String,
    pub kind: StepKind,
    /// Command after placeholder resolution
    pub command: String,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: String,
    pub duration_ms: u64,
    pub failed: bool,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub cancelled: bool,
}

/// One full pass of steps, marker evaluation and (conditionally) healing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-based sequence number
    pub number: usize,
    pub step_results: Vec<StepResult>,
    pub marker_results: Vec<MarkerResult>,
    /// Agent analysis for this round (empty when no healing happened)
    #[serde(default)]
    pub analysis: String,
    /// File changes the agent reported during healing
    #[serde(default)]
    pub changes: Vec<String>,
    pub duration_ms: u64,
}

impl Iteration {
    pub fn passed_count(&self) -> usize {
        self.marker_results.iter().filter(|m| m.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.marker_results.iter().all(|m| m.passed)
    }

    /// One-line summary used for older iterations in prompts and history
    pub fn summary_line(&self) -> String {
        format!(
            "Iteration {}: {}/{} markers passed, {} file(s) changed",
            self.number,
            self.passed_count(),
            self.marker_results.len(),
            self.changes.len()
        )
    }
}

/// One prompt/response exchange with the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub prompt: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Usage and cost totals reported by the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub turns: u64,
    pub agent_duration_ms: u64,
    pub invocations: u64,
}

/// The record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub id: Uuid,
    pub pipeline_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub iterations: Vec<Iteration>,
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub usage: UsageTotals,
    /// Fault message when the run ended on an unexpected error
    #[serde(default)]
    pub error: Option<String>,
}

impl RunSession {
    /// Start a new running session
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
            iterations: Vec::new(),
            transcript: Vec::new(),
            usage: UsageTotals::default(),
            error: None,
        }
    }

    /// Move the session to a terminal status
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    pub fn record_transcript(&mut self, prompt: String, response: String) {
        self.transcript.push(TranscriptEntry {
            prompt,
            response,
            timestamp: Utc::now(),
        });
    }

    /// Marker pass counts of every iteration, oldest first
    pub fn pass_counts(&self) -> Vec<usize> {
        self.iterations.iter().map(Iteration::passed_count).collect()
    }

    /// One-line summary of the terminal state
    pub fn summary_line(&self) -> String {
        let last = self
            .iterations
            .last()
            .map(|it| format!("{}/{} markers passing", it.passed_count(), it.marker_results.len()))
            .unwrap_or_else(|| "no completed iterations".to_string());
        let status = match self.status {
            RunStatus::Running => "is still running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "was aborted",
        };
        format!(
            "{} {} after {} iteration(s), {}",
            self.pipeline_name,
            status,
            self.iterations.len(),
            last
        )
    }
}
