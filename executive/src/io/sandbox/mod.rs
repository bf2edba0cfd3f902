//! Disposable isolated execution for untrusted code and commands.
//!
//! Every [`SandboxRunner::run`] call walks the same one-shot lifecycle:
//!
//! ```text
//! Idle -> Provisioning -> Running -> Collecting -> TornDown
//! ```
//!
//! A fault while provisioning or running skips `Collecting` and goes straight
//! to `TornDown`. Teardown destroys the environment and its private working
//! directory on every path before `run` returns, and running it twice is a
//! no-op. Nothing is retained between invocations: each call provisions a new
//! environment and a new working directory.
//!
//! The isolation mechanism itself sits behind [`IsolationBackend`]. Backends
//! must disable networking and apply the [`SandboxSpec`] limits; the runner
//! owns staging, timeouts, cancellation and teardown.

pub mod docker;

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::core::cancel::CancelToken;
use crate::core::types::{CANCELLED_EXIT_CODE, ProcessOutput, TIMEOUT_EXIT_CODE, ToolResult};
use crate::io::process::{CommandOutput, RunLimits, Termination, run_command};

/// Limits applied to every isolated invocation. Networking is always disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    /// Memory ceiling; swap is not granted on top of it.
    pub memory_limit_bytes: u64,
    /// Maximum number of processes inside the environment.
    pub pids_limit: u32,
    /// Wall-clock budget for the running phase.
    pub timeout: Duration,
}

impl Default for SandboxSpec {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 512 * 1024 * 1024,
            pids_limit: 128,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A file written into the private working directory before the command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Plain file name; separators and `..` are rejected.
    pub name: String,
    pub contents: String,
}

/// What to run inside one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxCommand {
    pub argv: Vec<String>,
    pub files: Vec<StagedFile>,
}

impl SandboxCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.push(StagedFile {
            name: name.into(),
            contents: contents.into(),
        });
        self
    }
}

/// A provisioned environment, valid until destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Backend-specific identifier (e.g. a container id).
    pub id: String,
    /// Host path of the private working directory.
    pub workdir: PathBuf,
    pub argv: Vec<String>,
}

/// Mechanism that creates, runs and destroys isolated environments.
pub trait IsolationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Create a fresh environment for `command` with networking disabled and
    /// `spec` limits applied. The staged files are already in `workdir`.
    ///
    /// On error nothing may be left behind: the backend cleans up anything it
    /// created before failing. Slow steps stop early once `cancel` fires.
    fn provision(
        &self,
        spec: &SandboxSpec,
        workdir: &Path,
        command: &SandboxCommand,
        cancel: &CancelToken,
    ) -> Result<Environment>;

    /// Host process that runs the environment to completion with its stdout
    /// and stderr attached.
    fn attach(&self, env: &Environment) -> Command;

    /// Destroy the environment. Destroying an already destroyed environment
    /// is not an error.
    fn destroy(&self, env: &Environment) -> Result<()>;
}

/// Lifecycle phase of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxPhase {
    Idle,
    Provisioning,
    Running,
    Collecting,
    TornDown,
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxResult {
    /// The command ran. Includes timed-out and cancelled runs, which carry the
    /// sentinel exit codes.
    Completed(ProcessOutput),
    /// The environment could not be provisioned or the command could not run.
    Failed { error: String },
}

impl From<SandboxResult> for ToolResult {
    fn from(result: SandboxResult) -> Self {
        match result {
            SandboxResult::Completed(output) => ToolResult::Process(output),
            SandboxResult::Failed { error } => ToolResult::Error { error },
        }
    }
}

/// Runs commands in one-shot isolated environments.
///
/// Cheap to clone; clones share the backend but never an environment.
#[derive(Clone)]
pub struct SandboxRunner {
    backend: Arc<dyn IsolationBackend>,
    spec: SandboxSpec,
    scratch_dir: Option<PathBuf>,
}

impl fmt::Debug for SandboxRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxRunner")
            .field("backend", &self.backend.name())
            .field("spec", &self.spec)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}

impl SandboxRunner {
    pub fn new(backend: Arc<dyn IsolationBackend>, spec: SandboxSpec) -> Self {
        Self {
            backend,
            spec,
            scratch_dir: None,
        }
    }

    /// Create private working directories under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn spec(&self) -> &SandboxSpec {
        &self.spec
    }

    /// Run `command` in a brand-new environment and tear it down.
    ///
    /// Blocks for at most the configured timeout plus provisioning and teardown.
    #[instrument(skip_all, fields(backend = self.backend.name(), timeout_ms = self.spec.timeout.as_millis() as u64))]
    pub fn run(&self, command: &SandboxCommand, cancel: &CancelToken) -> SandboxResult {
        let mut invocation = Invocation::new(self.backend.as_ref());
        let result = match self.drive(&mut invocation, command, cancel) {
            Ok(output) => SandboxResult::Completed(output),
            Err(err) => {
                let error = format!("{err:#}");
                warn!(phase = ?invocation.phase, err = %error, "sandbox invocation failed");
                SandboxResult::Failed { error }
            }
        };
        invocation.teardown();
        result
    }

    fn drive(
        &self,
        invocation: &mut Invocation<'_>,
        command: &SandboxCommand,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput> {
        invocation.phase = SandboxPhase::Provisioning;
        if command.argv.is_empty() {
            bail!("sandbox command must not be empty");
        }
        if cancel.is_cancelled() {
            bail!("cancelled before provisioning");
        }

        let workdir = self.create_workdir()?;
        let workdir_path = workdir.path().to_path_buf();
        invocation.workdir = Some(workdir);
        stage_files(&workdir_path, &command.files)?;

        let env = self
            .backend
            .provision(&self.spec, &workdir_path, command, cancel)
            .context("provision sandbox")?;
        info!(env = %env.id, "sandbox provisioned");
        invocation.env = Some(env.clone());
        if cancel.is_cancelled() {
            bail!("cancelled before running");
        }

        invocation.phase = SandboxPhase::Running;
        let output = run_command(
            self.backend.attach(&env),
            None,
            &RunLimits::unbounded_output(self.spec.timeout),
            Some(cancel),
        )
        .context("run sandboxed command")?;

        invocation.phase = SandboxPhase::Collecting;
        let collected = collect(&output);
        debug!(
            exit_code = collected.exit_code,
            stdout_bytes = collected.stdout.len(),
            stderr_bytes = collected.stderr.len(),
            "sandbox output collected"
        );
        Ok(collected)
    }

    fn create_workdir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("executive-sandbox-");
        match &self.scratch_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create scratch dir {}", dir.display()))?;
                builder
                    .tempdir_in(dir)
                    .with_context(|| format!("create working dir in {}", dir.display()))
            }
            None => builder.tempdir().context("create working dir"),
        }
    }
}

/// Destroy attempts before an environment is given up on.
const DESTROY_ATTEMPTS: usize = 2;

/// State of one invocation; tears itself down when dropped.
struct Invocation<'a> {
    backend: &'a dyn IsolationBackend,
    phase: SandboxPhase,
    workdir: Option<TempDir>,
    env: Option<Environment>,
}

impl<'a> Invocation<'a> {
    fn new(backend: &'a dyn IsolationBackend) -> Self {
        Self {
            backend,
            phase: SandboxPhase::Idle,
            workdir: None,
            env: None,
        }
    }

    /// Destroy the environment, then the working directory. Idempotent.
    fn teardown(&mut self) {
        if let Some(env) = self.env.take() {
            self.destroy(&env);
        }
        if let Some(workdir) = self.workdir.take() {
            let path = workdir.path().display().to_string();
            if let Err(err) = workdir.close() {
                warn!(workdir = %path, err = %err, "failed to remove sandbox working dir");
            }
        }
        self.phase = SandboxPhase::TornDown;
    }
}

impl Invocation<'_> {
    fn destroy(&self, env: &Environment) {
        for attempt in 1..=DESTROY_ATTEMPTS {
            match self.backend.destroy(env) {
                Ok(()) => {
                    debug!(env = %env.id, "sandbox environment destroyed");
                    return;
                }
                Err(err) => {
                    warn!(env = %env.id, attempt, err = %format!("{err:#}"), "sandbox teardown failed");
                }
            }
        }
    }
}

impl Drop for Invocation<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn collect(output: &CommandOutput) -> ProcessOutput {
    let exit_code = match output.termination {
        Termination::Exited => output.exit_code(),
        Termination::TimedOut => TIMEOUT_EXIT_CODE,
        Termination::Cancelled => CANCELLED_EXIT_CODE,
    };
    ProcessOutput {
        stdout: output.stdout_lossy(),
        stderr: output.stderr_lossy(),
        exit_code,
    }
}

fn stage_files(workdir: &Path, files: &[StagedFile]) -> Result<()> {
    for file in files {
        if !is_plain_file_name(&file.name) {
            bail!("staged file name must be a plain file name: {:?}", file.name);
        }
        let path = workdir.join(&file.name);
        fs::write(&path, &file.contents)
            .with_context(|| format!("stage {}", path.display()))?;
    }
    Ok(())
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
