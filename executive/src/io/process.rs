//! Helpers for running child processes with timeouts, cancellation and bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::budget::wait_slice;
use crate::core::cancel::CancelToken;

/// How often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Limits applied to one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Wall-clock budget; the child is killed when it expires.
    pub timeout: Duration,
    /// Bytes of stdout/stderr kept in memory (the rest is drained and discarded).
    pub output_limit_bytes: usize,
}

impl RunLimits {
    /// Limits that keep the full output.
    pub fn unbounded_output(timeout: Duration) -> Self {
        Self {
            timeout,
            output_limit_bytes: usize::MAX,
        }
    }
}

/// Why the child stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child exited on its own.
    Exited,
    /// The child was killed at the timeout.
    TimedOut,
    /// The child was killed because the caller cancelled.
    Cancelled,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub termination: Termination,
}

impl CommandOutput {
    pub fn timed_out(&self) -> bool {
        self.termination == Termination::TimedOut
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Numeric exit status; signal deaths map to `128 + signal` like a shell.
    pub fn exit_code(&self) -> i32 {
        exit_code(&self.status)
    }
}

#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(128)
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(128)
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs and stdin is fed from its
/// own thread. When `cancel` is given, it is polled while waiting and a
/// cancelled child is killed like a timed-out one.
#[instrument(skip_all, fields(timeout_ms = limits.timeout.as_millis() as u64))]
pub fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    limits: &RunLimits,
    cancel: Option<&CancelToken>,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    let deadline = Instant::now() + limits.timeout;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let output_limit_bytes = limits.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || child_stdin.write_all(&input)))
        }
        None => None,
    };

    let mut termination = Termination::Exited;
    let status = loop {
        let Some(slice) = wait_slice(deadline, POLL_INTERVAL) else {
            warn!(
                timeout_ms = limits.timeout.as_millis() as u64,
                "command timed out, killing"
            );
            termination = Termination::TimedOut;
            break kill_and_wait(&mut child)?;
        };
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            break status;
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            warn!("command cancelled, killing");
            termination = Termination::Cancelled;
            break kill_and_wait(&mut child)?;
        }
    };

    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(Ok(())) => {}
            // A child that exits without reading all input closes the pipe early.
            Ok(Err(err)) => debug!(err = %err, "stdin not fully written"),
            Err(_) => return Err(anyhow!("stdin writer thread panicked")),
        }
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), ?termination, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        termination,
    })
}

fn kill_and_wait(child: &mut std::process::Child) -> Result<ExitStatus> {
    if let Err(err) = child.kill() {
        // The child may have exited between the last wait and the kill.
        debug!(err = %err, "kill failed");
    }
    child.wait().context("wait command after kill")
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
