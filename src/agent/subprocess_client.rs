//! Agent CLI subprocess client - runs the agent in stream-json print mode

use crate::agent::{
    events::parse_line, AgentClientConfig, AgentError, AgentEvent, AgentRequest, AgentResponse, FileChange,
    ProgressCallback,
};
use crate::execution::process::{isolate_process_group, kill_process_tree, reap_descendants};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use std::time::Duration;
use tracing::{debug, warn};

/// How long to keep reading the streams once the agent process is gone
const STREAM_GRACE: Duration = Duration::from_secs(5);

/// Client for executing the agent CLI as a subprocess
#[derive(Debug, Clone)]
pub struct SubprocessClient {
    config: AgentClientConfig,
}

/// Aggregation state built up while events stream in
#[derive(Default)]
struct Aggregate {
    text: String,
    result_text: Option<String>,
    changed_files: Vec<FileChange>,
    usage: Option<crate::agent::UsageReport>,
}

impl Aggregate {
    fn absorb(&mut self, event: &AgentEvent) {
        for tool in event.tool_uses() {
            if tool.changes_files() {
                self.changed_files.push(FileChange {
                    tool: tool.name.clone(),
                    path: tool.file_path.clone(),
                });
            }
        }

        match event {
            AgentEvent::Assistant { text, .. } if !text.is_empty() => {
                if !self.text.is_empty() {
                    self.text.push('\n');
                }
                self.text.push_str(text);
            }
            AgentEvent::Result { text, usage, .. } => {
                self.result_text = text.clone();
                self.usage = Some(usage.clone());
            }
            _ => {}
        }
    }

    fn into_response(self, timed_out: bool, exit_code: Option<i32>) -> AgentResponse {
        let content = if self.text.is_empty() {
            self.result_text.unwrap_or_default()
        } else {
            self.text
        };

        AgentResponse {
            content,
            changed_files: self.changed_files,
            timed_out,
            exit_code,
            usage: self.usage,
        }
    }
}

impl SubprocessClient {
    pub fn new(config: AgentClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentClientConfig {
        &self.config
    }

    /// Command line for one request
    pub fn build_command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(self.config.executable());
        cmd.args(["-p", "--output-format", "stream-json", "--verbose"])
            .arg("--max-turns")
            .arg(request.max_turns.to_string());

        if !request.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(request.allowed_tools.join(","));
        }
        if let Some(model) = &self.config.model {
            cmd.arg("--model").arg(model);
        }
        cmd.args(&self.config.extra_args);

        cmd.current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        isolate_process_group(&mut cmd);
        cmd
    }

    /// Execute a request, streaming every parsed line to `callback`
    ///
    /// Returns once the process has exited and stdout is exhausted, or when
    /// the request's timeout fires (the process tree is killed and the
    /// partial response is returned with `timed_out` set).
    pub async fn execute(
        &self,
        request: &AgentRequest,
        callback: Option<&dyn ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse, AgentError> {
        debug!(
            prompt_len = request.prompt.len(),
            max_turns = request.max_turns,
            timeout_secs = request.timeout.as_secs(),
            "Spawning agent subprocess"
        );

        let mut cmd = self.build_command(request);
        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            program: self.config.executable().to_string(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = request.prompt.clone().into_bytes();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&prompt).await {
                    debug!(err = %e, "failed to write prompt to agent stdin");
                }
            });
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) if line.trim().is_empty() => continue,
                        Ok(Some(line)) => {
                            if tx.send(parse_line(line.trim())).is_err() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!(err = %e, "agent stdout read failed");
                            break;
                        }
                    }
                }
            });
        } else {
            drop(tx);
        }

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut sink = Vec::new();
                let _ = stderr.read_to_end(&mut sink).await;
            })
        });

        // The id is gone once the child has been waited on
        let pid = child.id();
        let mut aggregate = Aggregate::default();
        let mut stream_open = true;
        let mut status: Option<ExitStatus> = None;
        let deadline = tokio::time::sleep(request.timeout);
        tokio::pin!(deadline);

        let timed_out = loop {
            if !stream_open || status.is_some() {
                break false;
            }

            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        aggregate.absorb(&event);
                        if let Some(cb) = callback {
                            cb.on_event(&event);
                        }
                    }
                    None => stream_open = false,
                },
                exit = child.wait() => {
                    status = Some(exit?);
                }
                () = &mut deadline => break true,
                () = cancel.cancelled() => {
                    warn!("Agent invocation cancelled, killing process tree");
                    kill_process_tree(&mut child).await;
                    return Err(AgentError::Cancelled);
                }
            }
        };

        // Stdout closed first; the exit normally follows right behind
        let timed_out = if !timed_out && status.is_none() {
            tokio::select! {
                exit = child.wait() => {
                    status = Some(exit?);
                    false
                }
                () = &mut deadline => true,
                () = cancel.cancelled() => {
                    warn!("Agent invocation cancelled, killing process tree");
                    kill_process_tree(&mut child).await;
                    return Err(AgentError::Cancelled);
                }
            }
        } else {
            timed_out
        };

        if timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "Agent timed out, killing process tree");
            kill_process_tree(&mut child).await;
            let _ = child.wait().await;
            return Ok(finish_streams(aggregate, rx, callback, stderr_task, true, None).await);
        }

        // Background descendants would otherwise hold the pipes open
        reap_descendants(pid);

        let exit_code = status.and_then(|s| s.code());
        if exit_code != Some(0) {
            warn!(?exit_code, "Agent exited unsuccessfully");
        }

        let response = finish_streams(aggregate, rx, callback, stderr_task, false, exit_code).await;
        debug!(
            content_len = response.content.len(),
            changed_files = response.changed_files.len(),
            "Agent subprocess finished"
        );
        Ok(response)
    }
}

/// Drain the events still in flight, wait for stderr and build the response
///
/// Only called once the process tree is gone, so both readers hit EOF
/// promptly; the grace period covers a descendant that escaped the group.
async fn finish_streams(
    mut aggregate: Aggregate,
    mut rx: mpsc::UnboundedReceiver<AgentEvent>,
    callback: Option<&dyn ProgressCallback>,
    stderr_task: Option<JoinHandle<()>>,
    timed_out: bool,
    exit_code: Option<i32>,
) -> AgentResponse {
    let drain = async {
        while let Some(event) = rx.recv().await {
            aggregate.absorb(&event);
            if let Some(cb) = callback {
                cb.on_event(&event);
            }
        }
    };
    if tokio::time::timeout(STREAM_GRACE, drain).await.is_err() {
        warn!("Agent stdout still open after exit, dropping the rest of the stream");
    }

    if let Some(task) = stderr_task {
        if tokio::time::timeout(STREAM_GRACE, task).await.is_err() {
            debug!("Agent stderr still open after exit");
        }
    }

    aggregate.into_response(timed_out, exit_code)
}
