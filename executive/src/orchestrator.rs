//! Plan, execute and audit loop.
//!
//! One [`Orchestrator`] may serve many runs; every run owns its own plan,
//! execution context and results, and only the tool registry is shared.
//! Step and tool failures are recorded in the report and never stop a run.
//! The audit generation is the single failure that aborts [`Orchestrator::run`].

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, info_span, warn};

use crate::core::cancel::CancelToken;
use crate::core::context::{ExecutionContext, step_summary};
use crate::core::options::GenerationProfiles;
use crate::core::plan::{Plan, parse_plan};
use crate::core::types::{
    AuditReport, PlanStep, RunReport, RunStatus, StepResult, ToolOutputs, overall_success,
};
use crate::io::config::AgentConfig;
use crate::io::engine::Generator;
use crate::io::ids::{run_id, timestamp};
use crate::io::prompt::PromptBuilder;
use crate::observer::Observer;
use crate::tools::{ToolContext, ToolExecutor};

/// Orchestrator knobs, usually taken from [`AgentConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Hard cap on executed steps per run.
    pub max_iterations: usize,
    pub generation: GenerationProfiles,
    pub prompt_budget_bytes: usize,
    pub context_budget_bytes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for OrchestratorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            generation: config.generation.clone(),
            prompt_budget_bytes: config.prompt_budget_bytes,
            context_budget_bytes: config.context_budget_bytes,
        }
    }
}

pub struct Orchestrator<G> {
    engine: G,
    tools: Arc<ToolExecutor>,
    observer: Arc<dyn Observer>,
    config: OrchestratorConfig,
    prompts: PromptBuilder,
}

impl<G: Generator> Orchestrator<G> {
    pub fn new(
        engine: G,
        tools: Arc<ToolExecutor>,
        observer: Arc<dyn Observer>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        let prompts = PromptBuilder::new(config.prompt_budget_bytes, config.context_budget_bytes)?;
        Ok(Self {
            engine,
            tools,
            observer,
            config,
            prompts,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Ask the engine for a plan. Never fails: any problem yields the fallback plan.
    pub fn plan(&self, goal: &str) -> Plan {
        let plan = match self.request_plan(goal) {
            Ok(steps) => Plan::generated(steps),
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(err = %reason, "planning failed, using fallback plan");
                Plan::fallback(goal, reason)
            }
        };
        self.observer
            .plan_ready(goal, &plan.steps, plan.is_fallback());
        plan
    }

    fn request_plan(&self, goal: &str) -> Result<Vec<PlanStep>> {
        let prompt = self.prompts.plan(goal, &self.tools.describe())?;
        let response = self
            .engine
            .generate(&prompt, &self.config.generation.plan)
            .context("generate plan")?;
        debug!(response_bytes = response.len(), "plan response received");
        parse_plan(&response)
    }

    pub fn execute_step(&self, step: &PlanStep, context: &ExecutionContext) -> StepResult {
        self.execute_step_cancellable(step, context, &CancelToken::new())
    }

    /// Execute one step; `cancel` reaches any sandbox the step's tools start.
    pub fn execute_step_cancellable(
        &self,
        step: &PlanStep,
        context: &ExecutionContext,
        cancel: &CancelToken,
    ) -> StepResult {
        if step.uses_tools() {
            self.route_tools(step, context, cancel)
        } else {
            self.generate_step(step, context)
        }
    }

    fn generate_step(&self, step: &PlanStep, context: &ExecutionContext) -> StepResult {
        let generated = self.prompts.step(step, context).and_then(|prompt| {
            self.engine
                .generate(&prompt, &self.config.generation.step)
                .context("generate step output")
        });
        match generated {
            Ok(text) => StepResult::generated(text),
            Err(err) => StepResult::failed(format!("{err:#}")),
        }
    }

    /// Run every required tool in declaration order. Success reflects routing only.
    fn route_tools(
        &self,
        step: &PlanStep,
        context: &ExecutionContext,
        cancel: &CancelToken,
    ) -> StepResult {
        let rendered = context.render_tail(self.config.context_budget_bytes);
        let ctx = ToolContext {
            context: &rendered,
            cancel,
        };
        let mut seen = HashSet::new();
        let mut outputs = ToolOutputs::new();
        for name in &step.required_tools {
            if !seen.insert(name.as_str()) {
                continue;
            }
            let result = self.tools.run(name, &step.description, &ctx);
            outputs.push(name.clone(), result);
        }
        StepResult::routed(outputs)
    }

    /// Ask the engine to judge the run. The answer is returned unparsed.
    pub fn self_audit(
        &self,
        goal: &str,
        steps: &[PlanStep],
        context: &ExecutionContext,
    ) -> Result<AuditReport> {
        let prompt = self.prompts.audit(goal, steps, context)?;
        let text = self
            .engine
            .generate(&prompt, &self.config.generation.audit)
            .context("generate self audit")?;
        Ok(AuditReport::new(text))
    }

    pub fn run(&self, goal: &str) -> Result<RunReport> {
        self.run_with_cancel(goal, &CancelToken::new())
    }

    /// Plan, execute up to `max_iterations` steps, then audit.
    ///
    /// Cancellation stops the loop before the next step and interrupts a
    /// running sandbox; steps already finished stay in the report and are
    /// still audited.
    pub fn run_with_cancel(&self, goal: &str, cancel: &CancelToken) -> Result<RunReport> {
        let run_id = run_id();
        let span = info_span!("run", run_id = %run_id);
        let _entered = span.enter();
        let started_at = timestamp();
        info!(goal, "run started");

        let plan = self.plan(goal);
        let planned = plan.steps.len();

        let mut context = ExecutionContext::new();
        let capacity = planned.min(self.config.max_iterations);
        let mut executed: Vec<PlanStep> = Vec::with_capacity(capacity);
        let mut outputs: Vec<StepResult> = Vec::with_capacity(capacity);
        let mut status = RunStatus::Completed;

        for step in &plan.steps {
            if executed.len() >= self.config.max_iterations {
                warn!(
                    planned,
                    max_iterations = self.config.max_iterations,
                    "plan truncated at max_iterations"
                );
                status = RunStatus::Truncated {
                    planned,
                    max_iterations: self.config.max_iterations,
                };
                break;
            }
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled { planned };
                break;
            }

            self.observer.step_started(step);
            let result = self.execute_step_cancellable(step, &context, cancel);
            context.append(step_summary(step.number, &result));
            self.observer.step_finished(step, &result);
            executed.push(step.clone());
            outputs.push(result);
        }
        if status == RunStatus::Completed && cancel.is_cancelled() {
            status = RunStatus::Cancelled { planned };
        }
        if let RunStatus::Cancelled { .. } = status {
            warn!(executed = executed.len(), planned, "run cancelled");
        }

        let audit = self.self_audit(goal, &executed, &context)?;
        let report = RunReport {
            run_id,
            goal: goal.to_string(),
            plan_fallback: plan.is_fallback(),
            success: overall_success(&outputs, status),
            steps: executed,
            outputs,
            audit,
            status,
            final_context: context.render(),
            started_at,
            ended_at: timestamp(),
        };
        self.observer.run_finished(&report);
        Ok(report)
    }
}
