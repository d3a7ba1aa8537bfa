//! Healing rounds - hand the failing iteration to the coding agent

pub mod prompt;

use crate::agent::{AgentClientConfig, AgentError, AgentEvent, AgentExecutor, AgentResponse, CostTracker};
use crate::core::{Iteration, Pipeline, RunSession};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use prompt::{build_prompt, truncate_middle, PromptInput, PROMPT_BUDGET_CHARS, TRUNCATION_MARKER};

/// Longest assistant excerpt forwarded as an activity line
const ACTIVITY_PREVIEW_CHARS: usize = 200;

/// What a healing round produced
#[derive(Debug, Clone)]
pub struct HealingOutcome {
    pub analysis: String,
    pub changes: Vec<String>,
    pub response: AgentResponse,
}

/// Drives one agent invocation per failing iteration
pub struct HealingLoop<A: AgentExecutor> {
    agent: Arc<A>,
    config: AgentClientConfig,
    costs: CostTracker,
}

impl<A: AgentExecutor> HealingLoop<A> {
    pub fn new(agent: Arc<A>, config: AgentClientConfig) -> Self {
        Self {
            agent,
            config,
            costs: CostTracker::new(),
        }
    }

    pub fn config(&self) -> &AgentClientConfig {
        &self.config
    }

    /// Forget usage from earlier runs
    pub fn reset_costs(&self) {
        self.costs.reset();
    }

    /// Run one healing round for `current`
    ///
    /// The exchange is appended to the session transcript and the session's
    /// usage totals are refreshed. `activity` receives one line per notable
    /// agent event as it streams in.
    pub async fn heal(
        &self,
        session: &mut RunSession,
        pipeline: &Pipeline,
        current: &Iteration,
        activity: &(dyn Fn(String) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<HealingOutcome, AgentError> {
        let prompt = build_prompt(&PromptInput {
            pipeline,
            current,
            history: &session.iterations,
            transcript: &session.transcript,
        });
        info!(
            iteration = current.number,
            prompt_chars = prompt.chars().count(),
            "Starting healing round"
        );

        let request = self.config.request(prompt.clone(), pipeline.target_path.clone());
        let observer = |event: &AgentEvent| {
            if let Some(line) = describe_event(event) {
                debug!(%line, "agent activity");
                activity(line);
            }
        };

        let response = self.agent.invoke(&request, Some(&observer), cancel).await?;

        self.costs.record(response.usage.as_ref());
        session.usage = self.costs.totals();
        session.record_transcript(prompt, response.content.clone());

        let mut analysis = response.content.trim().to_string();
        if response.timed_out {
            warn!(iteration = current.number, "Agent timed out; keeping partial response");
            analysis.push_str("\n[agent timed out; response is partial]");
        } else if response.exit_code != Some(0) {
            let code = response
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            warn!(iteration = current.number, exit_code = %code, "Agent exited unsuccessfully");
            analysis.push_str(&format!("\n[agent exited with code {}]", code));
        }

        let changes = response.changed_files.iter().map(ToString::to_string).collect();
        Ok(HealingOutcome {
            analysis: analysis.trim().to_string(),
            changes,
            response,
        })
    }
}

/// One activity line for events worth showing live
pub fn describe_event(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::Assistant { text, tool_uses } => {
            let mut lines = Vec::new();
            if let Some(first) = text.lines().find(|l| !l.trim().is_empty()) {
                lines.push(preview(first.trim()));
            }
            lines.extend(tool_uses.iter().map(|tool| describe_tool(&tool.name, tool.file_path.as_deref())));
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        AgentEvent::ToolUse(tool) => Some(describe_tool(&tool.name, tool.file_path.as_deref())),
        AgentEvent::Result { is_error: true, .. } => Some("agent reported an error result".to_string()),
        _ => None,
    }
}

fn describe_tool(name: &str, path: Option<&str>) -> String {
    match path {
        Some(path) => format!("tool {} {}", name, path),
        None => format!("tool {}", name),
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(ACTIVITY_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
