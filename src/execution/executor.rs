//! Step executor - runs individual steps and records their results

use crate::{
    core::{Step, StepData, StepKind, StepResult},
    execution::{
        process::{run_process, shell_command, ProcessOutcome},
        variables::resolve_variables,
    },
};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-stream cap on captured output, in bytes
pub const OUTPUT_CAP_BYTES: usize = 50 * 1024;

/// Verbs of the .NET CLI that fail when a directory holds several build targets
const DOTNET_VERBS: &[&str] = &["build", "test", "restore", "run", "publish", "pack", "clean"];
const SOLUTION_EXTENSIONS: &[&str] = &["sln", "slnx"];
const PROJECT_EXTENSIONS: &[&str] = &["csproj", "fsproj", "vbproj"];

/// What a step produced before extraction and capping
struct Captured {
    exit_code: Option<i32>,
    output: String,
    error: String,
    failed: bool,
    timed_out: bool,
    cancelled: bool,
}

/// Executes a single step
#[derive(Debug, Clone)]
pub struct StepExecutor {
    output_cap: usize,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutor {
    pub fn new() -> Self {
        Self {
            output_cap: OUTPUT_CAP_BYTES,
        }
    }

    pub fn with_output_cap(output_cap: usize) -> Self {
        Self { output_cap }
    }

    /// Execute a step, writing its output and exit code into `data`
    pub async fn execute(
        &self,
        step: &Step,
        data: &mut StepData,
        target_path: &Path,
        cancel: &CancellationToken,
    ) -> StepResult {
        info!(step_id = %step.id, kind = ?step.kind, "Executing step");

        let workdir = working_dir(step, target_path);
        let command = resolve_build_ambiguity(&resolve_variables(&step.command, data), &workdir);
        debug!(step_id = %step.id, %command, workdir = %workdir.display(), "resolved command");

        let started = Instant::now();
        let mut captured = match (&step.kind, &step.file_path) {
            (StepKind::Extract, Some(path)) => {
                let path = resolve_variables(path, data);
                read_source(&workdir.join(path)).await
            }
            _ => run_command(&command, &workdir, step.timeout_secs, cancel).await,
        };

        if step.kind == StepKind::Extract && !captured.failed {
            if let Some(pattern) = &step.extract_pattern {
                apply_extraction(&mut captured, pattern);
            }
        }

        if !step.output_key.is_empty() {
            if !captured.failed {
                data.set(step.output_key.clone(), captured.output.clone());
            }
            data.set_exit_code(&step.output_key, captured.exit_code.unwrap_or(-1));
        }

        let result = StepResult {
            step_id: step.id.clone(),
            name: step.name.clone(),
            kind: step.kind,
            command,
            exit_code: captured.exit_code,
            output: cap_tail(&captured.output, self.output_cap),
            error: cap_tail(&captured.error, self.output_cap),
            duration_ms: started.elapsed().as_millis() as u64,
            failed: captured.failed,
            timed_out: captured.timed_out,
            cancelled: captured.cancelled,
        };

        if result.failed {
            warn!(step_id = %step.id, exit_code = ?result.exit_code, "Step failed");
        } else {
            info!(step_id = %step.id, duration_ms = result.duration_ms, "Step succeeded");
        }
        result
    }
}

fn working_dir(step: &Step, target_path: &Path) -> PathBuf {
    match &step.working_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => target_path.join(dir),
        None => target_path.to_path_buf(),
    }
}

async fn run_command(command: &str, workdir: &Path, timeout_secs: u64, cancel: &CancellationToken) -> Captured {
    let mut cmd = shell_command(command);
    cmd.current_dir(workdir);

    match run_process(cmd, None, Duration::from_secs(timeout_secs), cancel).await {
        Ok(output) => match output.outcome {
            ProcessOutcome::Exited(code) => Captured {
                exit_code: Some(code),
                output: output.stdout,
                error: output.stderr,
                failed: code != 0,
                timed_out: false,
                cancelled: false,
            },
            ProcessOutcome::TimedOut => Captured {
                exit_code: None,
                output: output.stdout,
                error: format!("Timed out after {} seconds\n{}", timeout_secs, output.stderr),
                failed: true,
                timed_out: true,
                cancelled: false,
            },
            ProcessOutcome::Cancelled => Captured {
                exit_code: None,
                output: output.stdout,
                error: format!("Cancelled\n{}", output.stderr),
                failed: true,
                timed_out: false,
                cancelled: true,
            },
        },
        Err(e) => Captured {
            exit_code: None,
            output: String::new(),
            error: e.to_string(),
            failed: true,
            timed_out: false,
            cancelled: false,
        },
    }
}

async fn read_source(path: &Path) -> Captured {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Captured {
            exit_code: Some(0),
            output: content,
            error: String::new(),
            failed: false,
            timed_out: false,
            cancelled: false,
        },
        Err(e) => Captured {
            exit_code: Some(1),
            output: String::new(),
            error: format!("Extract source not found: {} ({})", path.display(), e),
            failed: true,
            timed_out: false,
            cancelled: false,
        },
    }
}

/// Replace the output with the first capture group, or the whole match
fn apply_extraction(captured: &mut Captured, pattern: &str) {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            captured.failed = true;
            captured.error = format!("invalid extraction pattern: {}", e);
            return;
        }
    };

    let extracted = regex.captures(&captured.output).map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });

    match extracted {
        Some(value) => captured.output = value,
        None => {
            captured.failed = true;
            captured.error = "extraction pattern did not match".to_string();
        }
    }
}

/// Keep the last `cap` bytes of `text`, prefixed with a truncation marker
pub fn cap_tail(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }

    let mut start = text.len() - cap;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated {} bytes]\n{}", start, &text[start..])
}

/// Point a bare `dotnet <verb>` at one build target when several exist
///
/// The .NET CLI refuses to guess when a directory holds more than one
/// solution/project file. The first solution (or, failing that, the first
/// project) in lexical order is inserted right after the verb.
pub fn resolve_build_ambiguity(command: &str, workdir: &Path) -> String {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let (Some(program), Some(verb)) = (tokens.first(), tokens.get(1)) else {
        return command.to_string();
    };

    let is_dotnet = *program == "dotnet" || program.ends_with("/dotnet") || program.ends_with("dotnet.exe");
    if !is_dotnet || !DOTNET_VERBS.contains(verb) {
        return command.to_string();
    }

    let names_target = tokens
        .iter()
        .any(|t| has_extension(t, SOLUTION_EXTENSIONS) || has_extension(t, PROJECT_EXTENSIONS));
    let has_positional = tokens.get(2).is_some_and(|t| !t.starts_with('-'));
    if names_target || has_positional {
        return command.to_string();
    }

    let solutions = files_with_extensions(workdir, SOLUTION_EXTENSIONS);
    let projects = files_with_extensions(workdir, PROJECT_EXTENSIONS);
    if solutions.len() + projects.len() <= 1 {
        return command.to_string();
    }

    let Some(chosen) = solutions.first().or_else(|| projects.first()) else {
        return command.to_string();
    };

    let program_end = command.find(program).map(|i| i + program.len()).unwrap_or(0);
    let verb_end = command[program_end..]
        .find(verb)
        .map(|i| program_end + i + verb.len())
        .unwrap_or(command.len());

    let reference = if chosen.contains(char::is_whitespace) {
        format!("\"{}\"", chosen)
    } else {
        chosen.clone()
    };

    info!(%reference, "Disambiguating dotnet build target");
    format!("{} {}{}", &command[..verb_end], reference, &command[verb_end..])
}

fn has_extension(token: &str, extensions: &[&str]) -> bool {
    let token = token.trim_matches('"').to_ascii_lowercase();
    extensions.iter().any(|ext| token.ends_with(&format!(".{}", ext)))
}

fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| has_extension(name, extensions))
        .collect();
    names.sort();
    names
}
