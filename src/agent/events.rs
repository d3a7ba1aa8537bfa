//! Agent stream events - one JSON object per stdout line

use crate::agent::cost::UsageReport;
use serde_json::Value;

/// Tools whose invocation means the agent touched a file
pub const FILE_CHANGE_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit", "NotebookEdit"];

/// A tool invocation announced by the agent
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub input: Value,
    /// `input.file_path` when present
    pub file_path: Option<String>,
}

impl ToolInvocation {
    fn from_value(value: &Value) -> Self {
        let name = ["name", "tool", "tool_name"]
            .iter()
            .find_map(|field| value.get(*field).and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string();
        let input = value.get("input").cloned().unwrap_or(Value::Null);
        let file_path = input.get("file_path").and_then(Value::as_str).map(str::to_string);

        Self { name, input, file_path }
    }

    /// Whether this tool edits or writes files
    pub fn changes_files(&self) -> bool {
        FILE_CHANGE_TOOLS.contains(&self.name.as_str())
    }
}

/// A parsed protocol line
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Assistant message; tool calls embedded in its content blocks are lifted out
    Assistant {
        text: String,
        tool_uses: Vec<ToolInvocation>,
    },

    /// Stand-alone tool invocation
    ToolUse(ToolInvocation),

    /// Tool output, kept opaque
    ToolResult { content: Value },

    /// Final result of the run
    Result {
        text: Option<String>,
        is_error: bool,
        usage: UsageReport,
    },

    /// Well-formed event of a type the client does not act on
    ///
    /// Any JSON object with an unrecognised `type` (`system`, `user`, ...)
    /// lands here, not in [`AgentEvent::Raw`], which is kept for lines that
    /// are not JSON or carry no `type` at all.
    Other { kind: String },

    /// Line that is not JSON or lacks a `type`
    Raw { line: String },
}

impl AgentEvent {
    /// Every tool invocation carried by this event
    pub fn tool_uses(&self) -> Vec<&ToolInvocation> {
        match self {
            AgentEvent::Assistant { tool_uses, .. } => tool_uses.iter().collect(),
            AgentEvent::ToolUse(tool) => vec![tool],
            _ => Vec::new(),
        }
    }
}

/// Parse one protocol line
///
/// Never fails: anything unrecognisable comes back as [`AgentEvent::Raw`].
pub fn parse_line(line: &str) -> AgentEvent {
    let raw = || AgentEvent::Raw { line: line.to_string() };

    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return raw();
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return raw();
    };

    match kind {
        "assistant" => {
            let message = value.get("message").or_else(|| value.get("content")).unwrap_or(&Value::Null);
            let (text, tool_uses) = assistant_content(message);
            AgentEvent::Assistant { text, tool_uses }
        }
        "tool_use" => AgentEvent::ToolUse(ToolInvocation::from_value(&value)),
        "tool_result" => AgentEvent::ToolResult {
            content: value.get("content").cloned().unwrap_or(Value::Null),
        },
        "result" => AgentEvent::Result {
            text: value.get("result").and_then(Value::as_str).map(str::to_string),
            is_error: value.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            usage: UsageReport::from_result(&value),
        },
        other => AgentEvent::Other { kind: other.to_string() },
    }
}

/// Text and tool calls of an assistant message
///
/// The message is either a plain string or an object whose `content` is a
/// string or an array of typed blocks.
fn assistant_content(message: &Value) -> (String, Vec<ToolInvocation>) {
    let content = match message {
        Value::String(text) => return (text.clone(), Vec::new()),
        Value::Object(_) => message.get("content").unwrap_or(&Value::Null),
        _ => message,
    };

    match content {
        Value::String(text) => (text.clone(), Vec::new()),
        Value::Array(blocks) => {
            let mut text = String::new();
            let mut tools = Vec::new();
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(t) = block.get("text").and_then(Value::as_str) {
                            text.push_str(t);
                        }
                    }
                    Some("tool_use") => tools.push(ToolInvocation::from_value(block)),
                    _ => {}
                }
            }
            (text, tools)
        }
        _ => (String::new(), Vec::new()),
    }
}
