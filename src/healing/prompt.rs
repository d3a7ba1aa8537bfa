//! Prompt assembly for healing rounds

use crate::core::{FileAccess, Iteration, Pipeline, StepData, TranscriptEntry};
use crate::execution::variables::resolve_variables;
use std::fmt::Write;

/// Hard ceiling on prompt size, in characters
pub const PROMPT_BUDGET_CHARS: usize = 80_000;

pub const TRUNCATION_MARKER: &str = "[middle content truncated]";

/// Previous iterations rendered in full; older ones get one line each
const DETAILED_HISTORY: usize = 2;
const TRANSCRIPT_ENTRIES: usize = 2;

/// Past this many prior iterations, per-step caps shrink
const SHRINK_AFTER_ITERATIONS: usize = 3;

const FRAMING: &str = "\
You are repairing a software project so that an automated pipeline passes.
The pipeline runs a fixed set of steps (build, test, extract, validate) and then
checks a list of success markers. Your job is to change the project so that
every marker passes on the next run.

Ground rules:
- Read the failing output below before changing anything.
- Make the smallest change that fixes the root cause. Do not disable tests,
  weaken assertions or edit the pipeline definition.
- Only edit files that the file-access rules allow.
- When you are done, reply with a short analysis of what was wrong and what
  you changed.";

/// Everything the prompt is built from
pub struct PromptInput<'a> {
    pub pipeline: &'a Pipeline,
    /// The iteration being healed, with its step and marker results
    pub current: &'a Iteration,
    /// Completed iterations before `current`, oldest first
    pub history: &'a [Iteration],
    pub transcript: &'a [TranscriptEntry],
}

/// Build the healing prompt, never exceeding [`PROMPT_BUDGET_CHARS`]
pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let mut prompt = String::new();
    let pipeline = input.pipeline;

    prompt.push_str(FRAMING);
    let _ = write!(
        prompt,
        "\n\n## Pipeline\nName: {}\nTarget: {}\n",
        pipeline.name,
        pipeline.target_path.display()
    );
    if !pipeline.description.is_empty() {
        let _ = writeln!(prompt, "Description: {}", pipeline.description);
    }

    let _ = write!(
        prompt,
        "\n## Iteration {} marker results ({}/{} passing)\n",
        input.current.number,
        input.current.passed_count(),
        input.current.marker_results.len()
    );
    for result in &input.current.marker_results {
        let _ = writeln!(prompt, "{}", result.describe());
    }

    let (output_cap, error_cap) = if input.history.len() > SHRINK_AFTER_ITERATIONS {
        (2000, 1000)
    } else {
        (4000, 2000)
    };
    prompt.push_str("\n## Step results\n");
    for step in &input.current.step_results {
        let status = if step.timed_out {
            "timed out".to_string()
        } else if step.failed {
            format!("failed (exit {})", exit_label(step.exit_code))
        } else {
            format!("ok (exit {})", exit_label(step.exit_code))
        };
        let _ = write!(prompt, "\n### {} [{}]\n", step.name, status);
        if !step.command.is_empty() {
            let _ = writeln!(prompt, "Command: {}", step.command);
        }
        if !step.output.trim().is_empty() {
            let _ = write!(prompt, "Output:\n```\n{}\n```\n", tail_chars(&step.output, output_cap));
        }
        if !step.error.trim().is_empty() {
            let _ = write!(prompt, "Errors:\n```\n{}\n```\n", tail_chars(&step.error, error_cap));
        }
    }

    if !input.history.is_empty() {
        prompt.push_str("\n## Previous iterations\n");
        let split = input.history.len().saturating_sub(DETAILED_HISTORY);
        for older in &input.history[..split] {
            let _ = writeln!(prompt, "- {}", older.summary_line());
        }
        for recent in &input.history[split..] {
            render_iteration(&mut prompt, recent);
        }
    }

    let recent_transcript = &input.transcript[input.transcript.len().saturating_sub(TRANSCRIPT_ENTRIES)..];
    if !recent_transcript.is_empty() {
        prompt.push_str("\n## Your previous responses\n");
        for entry in recent_transcript {
            let preview_cap = if prompt.chars().count() > PROMPT_BUDGET_CHARS / 2 {
                400
            } else {
                800
            };
            let _ = write!(
                prompt,
                "\n[{}]\n{}\n",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                head_chars(&entry.response, preview_cap)
            );
        }
    }

    prompt.push_str("\n## File access\n");
    for (label, access) in [
        ("Editable", FileAccess::Editable),
        ("Read-only", FileAccess::ReadOnly),
        ("Excluded (do not open or modify)", FileAccess::Excluded),
    ] {
        let patterns = pipeline.patterns_with(access);
        let rendered = if patterns.is_empty() {
            "(none)".to_string()
        } else {
            patterns.join(", ")
        };
        let _ = writeln!(prompt, "{}: {}", label, rendered);
    }

    if !pipeline.healing_context.trim().is_empty() {
        let mut placeholders = StepData::new();
        placeholders.set("pipeline_name", pipeline.name.clone());
        placeholders.set("target_path", pipeline.target_path.display().to_string());
        placeholders.set("iteration", input.current.number.to_string());
        let _ = write!(
            prompt,
            "\n## Project context\n{}\n",
            resolve_variables(&pipeline.healing_context, &placeholders)
        );
    }

    truncate_middle(&prompt, PROMPT_BUDGET_CHARS)
}

fn render_iteration(prompt: &mut String, iteration: &Iteration) {
    let _ = write!(
        prompt,
        "\n### Iteration {} ({}/{} markers passed)\n",
        iteration.number,
        iteration.passed_count(),
        iteration.marker_results.len()
    );
    for result in &iteration.marker_results {
        let _ = writeln!(prompt, "{}", result.describe());
    }
    for step in &iteration.step_results {
        let _ = writeln!(
            prompt,
            "- step {}: {} (exit {})",
            step.name,
            if step.failed { "failed" } else { "ok" },
            exit_label(step.exit_code)
        );
    }
    if !iteration.changes.is_empty() {
        let _ = writeln!(prompt, "Changes: {}", iteration.changes.join(", "));
    }
    if !iteration.analysis.is_empty() {
        let _ = writeln!(prompt, "Analysis: {}", head_chars(&iteration.analysis, 800));
    }
}

fn exit_label(code: Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
}

fn head_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn tail_chars(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let start = text.char_indices().nth(total - max).map(|(i, _)| i).unwrap_or(0);
    format!("...{}", &text[start..])
}

/// Cut the middle out of `text` so the result fits `budget` characters
///
/// Keeps roughly the first third and the last two thirds of the space, with a
/// single [`TRUNCATION_MARKER`] between them.
pub fn truncate_middle(text: &str, budget: usize) -> String {
    let total = text.chars().count();
    if total <= budget {
        return text.to_string();
    }

    let separator = format!("\n\n{}\n\n", TRUNCATION_MARKER);
    let available = budget.saturating_sub(separator.chars().count());
    let head_len = available / 3;
    let tail_len = available - head_len;

    let head_end = text.char_indices().nth(head_len).map(|(i, _)| i).unwrap_or(text.len());
    let tail_start = text
        .char_indices()
        .nth(total - tail_len)
        .map(|(i, _)| i)
        .unwrap_or(text.len());

    format!("{}{}{}", &text[..head_end], separator, &text[tail_start..])
}
