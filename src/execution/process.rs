//! Process runner - spawns commands with concurrent output draining,
//! timeouts, cancellation and process-tree termination.

use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long to wait for the output readers once the process is gone.
///
/// Pipes close as soon as every holder dies; this only guards against a
/// stray grandchild keeping them open.
const IO_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// How a process run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own (-1 when killed by a signal)
    Exited(i32),
    /// The wall-clock timeout fired and the process tree was killed
    TimedOut,
    /// Cancellation was requested and the process tree was killed
    Cancelled,
}

/// Captured result of a process run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub outcome: ProcessOutcome,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Exit code when the process exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ProcessOutcome::Exited(code) => Some(code),
            _ => None,
        }
    }
}

/// Errors that prevent a process from running at all
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while waiting for process: {0}")]
    Io(#[from] io::Error),
}

/// Build a command for a shell-style command string
///
/// Commands containing whitespace are routed through the platform shell,
/// except a single quoted literal which is treated as a program path.
pub fn shell_command(command: &str) -> Command {
    let trimmed = command.trim();

    if let Some(literal) = quoted_literal(trimmed) {
        return Command::new(literal);
    }
    if !trimmed.contains(char::is_whitespace) {
        return Command::new(trimmed);
    }

    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(trimmed);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(trimmed);
        cmd
    }
}

fn quoted_literal(command: &str) -> Option<&str> {
    let inner = command.strip_prefix('"')?.strip_suffix('"')?;
    (!inner.contains('"')).then_some(inner)
}

/// Put the child in its own process group so the whole tree can be killed
pub fn isolate_process_group(cmd: &mut Command) {
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.kill_on_drop(true);
}

/// Kill every process in the group led by `pid`
///
/// On unix the group outlives its leader. Windows has no groups;
/// `taskkill /T` walks the tree of a live leader instead.
pub fn kill_process_group(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, err = %e, "killpg failed");
        }
    }

    #[cfg(windows)]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Kill what is left of the group of a leader that already exited
///
/// Windows reuses ids of exited processes freely and has no groups to
/// address, so there this does nothing.
pub fn reap_descendants(leader: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = leader {
        kill_process_group(pid);
    }
    #[cfg(not(unix))]
    let _ = leader;
}

/// Kill the child and every process in its group
pub async fn kill_process_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }

    if let Err(e) = child.kill().await {
        debug!(err = %e, "kill after process group termination failed");
    }
}

/// Run a command to completion, timeout or cancellation
///
/// Stdout and stderr are drained on independent tasks while the process
/// runs so a full pipe can never block the child.
pub async fn run_process(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    let program = format!("{:?}", cmd.as_std().get_program());

    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate_process_group(&mut cmd);

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|source| ProcessError::Spawn { program, source })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_vec();
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(&input).await {
                debug!(err = %e, "stdin write failed");
            }
            // Dropping the pipe closes the child's stdin
        });
    }

    // The id is gone once the child has been waited on
    let pid = child.id();
    let stdout = Capture::spawn(child.stdout.take(), "stdout");
    let stderr = Capture::spawn(child.stderr.take(), "stderr");

    let outcome = tokio::select! {
        status = child.wait() => ProcessOutcome::Exited(status?.code().unwrap_or(-1)),
        () = tokio::time::sleep(timeout) => ProcessOutcome::TimedOut,
        () = cancel.cancelled() => ProcessOutcome::Cancelled,
    };

    if outcome == ProcessOutcome::TimedOut || outcome == ProcessOutcome::Cancelled {
        warn!(?outcome, timeout_secs = timeout.as_secs(), "killing process tree");
        kill_process_tree(&mut child).await;
        let _ = child.wait().await;
    } else {
        // Background descendants would otherwise hold the pipes open
        reap_descendants(pid);
    }

    let stdout = stdout.finish().await;
    let stderr = stderr.finish().await;

    debug!(?outcome, elapsed_ms = started.elapsed().as_millis() as u64, "process finished");
    Ok(ProcessOutput {
        outcome,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        elapsed: started.elapsed(),
    })
}

/// One output stream drained on its own task into a shared buffer
///
/// Whatever was read survives even if the reader has to be abandoned.
struct Capture {
    label: &'static str,
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl Capture {
    fn spawn<R>(reader: Option<R>, label: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|reader| tokio::spawn(read_into(reader, Arc::clone(&buf))));
        Self { label, buf, task }
    }

    async fn finish(self) -> Vec<u8> {
        if let Some(task) = self.task {
            match tokio::time::timeout(IO_CAPTURE_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => warn!(stream = self.label, error = %err, "output capture failed"),
                Ok(Err(err)) => warn!(stream = self.label, error = %err, "output reader panicked"),
                Err(_) => warn!(stream = self.label, "output capture timed out, keeping partial output"),
            }
        }

        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }
}

async fn read_into<R: AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) -> io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(&chunk[..n]);
    }
}
