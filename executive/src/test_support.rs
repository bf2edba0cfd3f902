//! Test-only fakes: scripted engine, recording observer, canned tools and an
//! in-process isolation backend.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};

use crate::core::cancel::CancelToken;
use crate::core::options::GenerationOptions;
use crate::core::types::{PlanStep, RunReport, StepResult, ToolResult};
use crate::io::engine::Generator;
use crate::io::sandbox::{
    Environment, IsolationBackend, SandboxCommand, SandboxRunner, SandboxSpec,
};
use crate::observer::{Observer, ToolOutcome};
use crate::tools::{Capability, ToolContext};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Deterministic plan step.
pub fn step(number: u32, description: &str, tools: &[&str]) -> PlanStep {
    PlanStep {
        number,
        description: description.to_string(),
        required_tools: tools.iter().map(|tool| (*tool).to_string()).collect(),
        expected_output: format!("output of step {number}"),
    }
}

/// Planning response listing `steps` as a JSON array.
pub fn plan_json(steps: &[PlanStep]) -> String {
    serde_json::to_string(steps).unwrap_or_else(|err| panic!("serialize plan: {err}"))
}

/// Generator that replays queued replies and records every call.
///
/// An exhausted queue is an error, so tests notice unexpected engine calls.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(String, GenerationOptions)>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    /// Queue successes and failures (`Err` holds the error message).
    pub fn from_replies(replies: impl IntoIterator<Item = Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Prompts and options seen so far, in call order.
    pub fn calls(&self) -> Vec<(String, GenerationOptions)> {
        lock(&self.calls).clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|(prompt, _)| prompt.clone()).collect()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        lock(&self.calls).push((prompt.to_string(), options.clone()));
        match lock(&self.replies).pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => bail!("scripted generator has no reply left"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Plan { steps: usize, fallback: bool },
    StepStarted { number: u32 },
    StepFinished { number: u32, success: bool },
    Tool { name: String, error: Option<String> },
    RunFinished { success: bool },
}

/// Observer that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }

    pub fn tool_events(&self) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, RecordedEvent::Tool { .. }))
            .collect()
    }

    fn record(&self, event: RecordedEvent) {
        lock(&self.events).push(event);
    }
}

impl Observer for RecordingObserver {
    fn plan_ready(&self, _goal: &str, steps: &[PlanStep], fallback: bool) {
        self.record(RecordedEvent::Plan {
            steps: steps.len(),
            fallback,
        });
    }

    fn step_started(&self, step: &PlanStep) {
        self.record(RecordedEvent::StepStarted {
            number: step.number,
        });
    }

    fn step_finished(&self, step: &PlanStep, result: &StepResult) {
        self.record(RecordedEvent::StepFinished {
            number: step.number,
            success: result.success,
        });
    }

    fn tool_invoked(&self, tool: &str, outcome: &ToolOutcome<'_>) {
        let error = match outcome {
            ToolOutcome::Succeeded => None,
            ToolOutcome::Failed { error } => Some((*error).to_string()),
        };
        self.record(RecordedEvent::Tool {
            name: tool.to_string(),
            error,
        });
    }

    fn run_finished(&self, report: &RunReport) {
        self.record(RecordedEvent::RunFinished {
            success: report.success,
        });
    }
}

/// Always returns the same result.
#[derive(Debug, Clone)]
pub struct StaticTool {
    result: ToolResult,
}

impl StaticTool {
    pub fn new(result: ToolResult) -> Self {
        Self { result }
    }
}

impl Capability for StaticTool {
    fn run(&self, _input: &str, _ctx: &ToolContext<'_>) -> Result<ToolResult> {
        Ok(self.result.clone())
    }
}

/// Always fails with the given message.
#[derive(Debug, Clone)]
pub struct FailingTool {
    message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Capability for FailingTool {
    fn run(&self, _input: &str, _ctx: &ToolContext<'_>) -> Result<ToolResult> {
        Err(anyhow!(self.message.clone()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PanickingTool;

impl Capability for PanickingTool {
    fn run(&self, _input: &str, _ctx: &ToolContext<'_>) -> Result<ToolResult> {
        panic!("tool exploded");
    }
}

/// Records `(input, context)` of every call and returns an empty data result.
#[derive(Debug, Clone, Default)]
pub struct RecordingTool {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingTool {
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

impl Capability for RecordingTool {
    fn run(&self, input: &str, ctx: &ToolContext<'_>) -> Result<ToolResult> {
        lock(&self.calls).push((input.to_string(), ctx.context.to_string()));
        Ok(ToolResult::Data(serde_json::Value::Null))
    }
}

/// Isolation backend that runs argv directly on the host, inside the private
/// working directory, with a scrubbed environment.
///
/// Provides no isolation at all; it exists to exercise the runner's staging,
/// timeout and teardown handling without a container runtime.
#[derive(Debug, Default)]
pub struct LocalBackend {
    next_id: AtomicUsize,
    fail_provision: Option<String>,
    /// Remaining `destroy` calls that fail before one succeeds.
    destroy_failures: AtomicUsize,
    provisioned: Mutex<Vec<Environment>>,
    destroyed: Mutex<HashMap<String, usize>>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose provisioning always fails with `message`.
    pub fn failing_provision(message: impl Into<String>) -> Self {
        Self {
            fail_provision: Some(message.into()),
            ..Self::default()
        }
    }

    /// Backend whose first `failures` destroy calls fail.
    pub fn failing_destroys(failures: usize) -> Self {
        Self {
            destroy_failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub fn provisioned(&self) -> Vec<Environment> {
        lock(&self.provisioned).clone()
    }

    /// How many times `destroy` was called for environment `id`.
    pub fn destroy_calls(&self, id: &str) -> usize {
        lock(&self.destroyed).get(id).copied().unwrap_or(0)
    }

    /// Environments provisioned but never destroyed.
    pub fn outstanding(&self) -> usize {
        self.provisioned()
            .iter()
            .filter(|env| self.destroy_calls(&env.id) == 0)
            .count()
    }
}

impl IsolationBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn provision(
        &self,
        _spec: &SandboxSpec,
        workdir: &Path,
        command: &SandboxCommand,
        _cancel: &CancelToken,
    ) -> Result<Environment> {
        if let Some(message) = &self.fail_provision {
            bail!("{message}");
        }
        let env = Environment {
            id: format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            workdir: workdir.to_path_buf(),
            argv: command.argv.clone(),
        };
        lock(&self.provisioned).push(env.clone());
        Ok(env)
    }

    fn attach(&self, env: &Environment) -> Command {
        let mut cmd = Command::new(&env.argv[0]);
        cmd.args(&env.argv[1..])
            .current_dir(&env.workdir)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default());
        cmd
    }

    fn destroy(&self, env: &Environment) -> Result<()> {
        *lock(&self.destroyed).entry(env.id.clone()).or_insert(0) += 1;
        let failing = self
            .destroy_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            bail!("destroy {} failed", env.id);
        }
        Ok(())
    }
}

/// Sandbox runner on a fresh [`LocalBackend`], returned alongside it.
pub fn local_sandbox(timeout: Duration) -> (Arc<LocalBackend>, SandboxRunner) {
    let backend = Arc::new(LocalBackend::new());
    let runner = SandboxRunner::new(
        backend.clone(),
        SandboxSpec {
            timeout,
            ..SandboxSpec::default()
        },
    );
    (backend, runner)
}
