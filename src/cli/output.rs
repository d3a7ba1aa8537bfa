//! CLI output formatting

use crate::{
    core::{RunSession, RunStatus, StepResult},
    execution::ExecutionEvent,
    persistence::SessionSummary,
};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static WRENCH: Emoji<'_, '_> = Emoji("🔧 ", "* ");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "| ");

/// Horizontal rule sized to the terminal
pub fn separator() -> String {
    let width = term_size::dimensions().map(|(w, _)| w).unwrap_or(80).min(100);
    style("─".repeat(width)).dim().to_string()
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Aborted => style("ABORTED").yellow().to_string(),
    }
}

fn status_icon(status: RunStatus) -> &'static Emoji<'static, 'static> {
    match status {
        RunStatus::Succeeded => &CHECK,
        RunStatus::Failed => &CROSS,
        RunStatus::Running => &SPINNER,
        RunStatus::Aborted => &WARN,
    }
}

/// Format a stored session summary for display
pub fn format_session_summary(summary: &SessionSummary) -> String {
    format!(
        "{} {} - {} - {} - {} iteration(s), {}/{} markers - {}",
        status_icon(summary.status),
        style(&summary.session_id.to_string()[..8]).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.iterations,
        summary.markers_passed,
        summary.markers_total,
        style(format!("${:.2}", summary.cost_usd)).cyan()
    )
}

fn format_step_result(result: &StepResult) -> String {
    let exit = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let timing = style(format!("{}ms", result.duration_ms)).dim();

    if result.timed_out {
        format!("{} {} timed out {}", CROSS, style(&result.name).red(), timing)
    } else if result.failed {
        format!("{} {} (exit {}) {}", CROSS, style(&result.name).red(), exit, timing)
    } else {
        format!("{} {} {}", CHECK, style(&result.name).green(), timing)
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            session_id,
            pipeline_name,
            max_iterations,
        } => {
            let cap = if *max_iterations == 0 {
                "unbounded".to_string()
            } else {
                format!("up to {} iterations", max_iterations)
            };
            format!(
                "{} Starting pipeline {} ({}, {})",
                ROCKET,
                style(pipeline_name).bold(),
                cap,
                style(&session_id.to_string()[..8]).dim()
            )
        }
        ExecutionEvent::IterationStarted { iteration } => {
            format!("{}\n{} Iteration {}", separator(), INFO, style(iteration).bold())
        }
        ExecutionEvent::StepStarted { name, .. } => format!("{} {}", SPINNER, style(name).cyan()),
        ExecutionEvent::StepFinished { result, .. } => format_step_result(result),
        ExecutionEvent::MarkersEvaluated { results, .. } => results
            .iter()
            .map(|r| {
                let line = format!("  {}", r.describe());
                if r.passed {
                    style(line).green().to_string()
                } else {
                    style(line).red().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ExecutionEvent::HealingStarted { iteration } => {
            format!("{} Healing iteration {}", WRENCH, iteration)
        }
        ExecutionEvent::AgentActivity { message, .. } => {
            message
                .lines()
                .map(|line| format!("    {}", style(line).dim()))
                .collect::<Vec<_>>()
                .join("\n")
        }
        ExecutionEvent::HealingFinished { changes, .. } => {
            if changes.is_empty() {
                format!("{} Agent finished without changing files", INFO)
            } else {
                format!("{} Agent changed: {}", WRENCH, style(changes.join(", ")).cyan())
            }
        }
        ExecutionEvent::Paused => format!("{} Paused", PAUSE),
        ExecutionEvent::Resumed => format!("{} Resumed", INFO),
        ExecutionEvent::RegressionDetected { pass_counts, .. } => format!(
            "{} Regression detected (pass counts {:?}), stopping",
            WARN, pass_counts
        ),
        ExecutionEvent::RunFinished { status, summary, .. } => {
            format!("{}\n{} {}", separator(), status_icon(*status), summary)
        }
    }
}

/// Print a session record in full
pub fn print_session_details(session: &RunSession) {
    println!("{} Session Details", INFO);
    println!("  ID: {}", style(session.id).cyan());
    println!("  Pipeline: {}", style(&session.pipeline_name).bold());
    println!("  Status: {}", format_status(session.status));
    println!("  Started: {}", style(session.started_at.to_rfc3339()).dim());
    if let Some(ended) = session.ended_at {
        println!("  Ended: {}", style(ended.to_rfc3339()).dim());
        if let Ok(duration) = ended.signed_duration_since(session.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    if let Some(error) = &session.error {
        println!("  Error: {}", style(error).red());
    }
    print_usage(session);

    for iteration in &session.iterations {
        println!("\n  {}", style(iteration.summary_line()).bold());
        for result in &iteration.marker_results {
            println!("    {}", result.describe());
        }
        for change in &iteration.changes {
            println!("    changed {}", style(change).cyan());
        }
    }
}

/// Print agent usage totals when any agent was invoked
pub fn print_usage(session: &RunSession) {
    let usage = &session.usage;
    if usage.invocations == 0 {
        return;
    }
    println!(
        "  Agent: {} invocation(s), {} turns, {} in / {} out tokens, {}",
        usage.invocations,
        usage.turns,
        usage.input_tokens,
        usage.output_tokens,
        style(format!("${:.4}", usage.cost_usd)).cyan()
    );
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
