//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use healing_pipeline::agent::{
    AgentClientConfig, AgentError, AgentEvent, AgentExecutor, AgentRequest, AgentResponse, FileChange,
    ProgressCallback, ToolInvocation,
};
use healing_pipeline::core::config::PipelineConfig;
use healing_pipeline::core::{Pipeline, RunSession};
use healing_pipeline::execution::{ExecutionEngine, ExecutionEvent};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Something the mock agent does to the target project before answering
pub type Fix = Box<dyn Fn(&Path) + Send + Sync>;

/// Agent that answers from a script and optionally edits files
///
/// Each invocation takes the next scripted reply; once the script runs out
/// the last reply is repeated. Every prompt it receives is kept for
/// inspection.
pub struct MockAgent {
    replies: Vec<String>,
    fixes: Vec<Option<Fix>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockAgent {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(String::from).collect(),
            fixes: Vec::new(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the `n`th invocation (zero-based) run `fix` against the target
    pub fn with_fix<F>(mut self, n: usize, fix: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        if self.fixes.len() <= n {
            self.fixes.resize_with(n + 1, || None);
        }
        self.fixes[n] = Some(Box::new(fix));
        self
    }

    /// Shared view of the prompts received so far
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

#[async_trait]
impl AgentExecutor for MockAgent {
    async fn invoke(
        &self,
        request: &AgentRequest,
        callback: Option<&dyn ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let n = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt.clone());
            prompts.len() - 1
        };
        let reply = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();

        let mut response = AgentResponse::new(reply.clone());
        if let Some(Some(fix)) = self.fixes.get(n) {
            fix(request.working_dir.as_path());
            response.changed_files.push(FileChange {
                tool: "Write".to_string(),
                path: Some("fixed".to_string()),
            });
        }

        if let Some(cb) = callback {
            cb.on_event(&AgentEvent::Assistant {
                text: reply,
                tool_uses: Vec::new(),
            });
            for change in &response.changed_files {
                cb.on_event(&AgentEvent::ToolUse(ToolInvocation {
                    name: change.tool.clone(),
                    input: serde_json::Value::Null,
                    file_path: change.path.clone(),
                }));
            }
        }

        Ok(response)
    }
}

/// Parse YAML into a pipeline rooted at `target`
pub fn pipeline_at(yaml: &str, target: &Path) -> Pipeline {
    let mut pipeline = PipelineConfig::from_yaml(yaml)
        .expect("fixture YAML should be valid")
        .to_pipeline();
    pipeline.target_path = target.to_path_buf();
    pipeline
}

/// Engine plus a log of every event it emitted
pub fn engine_with_log(agent: MockAgent) -> (ExecutionEngine<MockAgent>, Arc<Mutex<Vec<ExecutionEvent>>>) {
    let engine = ExecutionEngine::new(agent, AgentClientConfig::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));
    (engine, log)
}

/// Pass counts per iteration, oldest first
pub fn pass_counts(session: &RunSession) -> Vec<usize> {
    session.iterations.iter().map(|i| i.passed_count()).collect()
}
