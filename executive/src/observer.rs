//! Hooks for watching a run as it happens.
//!
//! The orchestrator and tool executor report milestones through [`Observer`].
//! [`TracingObserver`] turns them into structured log events; tests swap in a
//! recording observer to assert on what happened without parsing logs.

use tracing::{info, warn};

use crate::core::types::{PlanStep, RunReport, StepResult};

/// How a single tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome<'a> {
    Succeeded,
    Failed { error: &'a str },
}

pub trait Observer: Send + Sync {
    fn plan_ready(&self, _goal: &str, _steps: &[PlanStep], _fallback: bool) {}

    fn step_started(&self, _step: &PlanStep) {}

    fn step_finished(&self, _step: &PlanStep, _result: &StepResult) {}

    /// Called exactly once per tool invocation, after it finished.
    fn tool_invoked(&self, tool: &str, outcome: &ToolOutcome<'_>);

    fn run_finished(&self, _report: &RunReport) {}
}

/// Emits every milestone as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn plan_ready(&self, goal: &str, steps: &[PlanStep], fallback: bool) {
        if fallback {
            warn!(goal, steps = steps.len(), "using fallback plan");
        } else {
            info!(goal, steps = steps.len(), "plan ready");
        }
    }

    fn step_started(&self, step: &PlanStep) {
        info!(
            step = step.number,
            tools = ?step.required_tools,
            "step started"
        );
    }

    fn step_finished(&self, step: &PlanStep, result: &StepResult) {
        match &result.error {
            Some(error) => warn!(step = step.number, error = %error, "step failed"),
            None => info!(step = step.number, "step finished"),
        }
    }

    fn tool_invoked(&self, tool: &str, outcome: &ToolOutcome<'_>) {
        match outcome {
            ToolOutcome::Succeeded => info!(tool, "tool executed"),
            ToolOutcome::Failed { error } => warn!(tool, error = %error, "tool failed"),
        }
    }

    fn run_finished(&self, report: &RunReport) {
        info!(
            run_id = %report.run_id,
            success = report.success,
            status = ?report.status,
            steps = report.outputs.len(),
            "run finished"
        );
    }
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn tool_invoked(&self, _tool: &str, _outcome: &ToolOutcome<'_>) {}
}
