//! Shared data model for plans, step results, tool results and run reports.
//!
//! Everything here is created fresh for one run and never mutated after
//! construction. Serialized shapes are stable contracts: other components (and
//! downstream consumers of the run report) depend on them field for field.

use serde::{Deserialize, Serialize, Serializer};

/// Exit code reported when the sandbox killed a command at its wall-clock timeout.
///
/// Normal process exits are never negative, so this cannot collide with a real
/// exit status.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Exit code reported when a run was cancelled while the command was running.
pub const CANCELLED_EXIT_CODE: i32 = -2;

/// One atomic unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 1-based position; plans are numbered `1..=N` with no gaps.
    pub number: u32,
    pub description: String,
    /// Tool names in declaration order. Empty means direct generation.
    #[serde(default)]
    pub required_tools: Vec<String>,
    /// Advisory documentation of what the step should produce. Never checked.
    pub expected_output: String,
}

impl PlanStep {
    /// The single step substituted when a plan cannot be produced.
    pub fn fallback(goal: &str) -> Self {
        Self {
            number: 1,
            description: goal.to_string(),
            required_tools: Vec::new(),
            expected_output: "Completion".to_string(),
        }
    }

    pub fn uses_tools(&self) -> bool {
        !self.required_tools.is_empty()
    }
}

/// Name and one-line summary of a registered tool, as shown to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub summary: String,
}

/// Output of a completed process: the sandbox result schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }

    pub fn cancelled(&self) -> bool {
        self.exit_code == CANCELLED_EXIT_CODE
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Page body returned by the web fetch tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub content: String,
}

/// Tool-specific payload of one tool invocation.
///
/// Serialized untagged so each variant keeps its wire shape:
/// `{stdout, stderr, exit_code}`, `{url, status, content}`, `{error}`, or an
/// arbitrary JSON value for custom tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResult {
    Process(ProcessOutput),
    Page(FetchedPage),
    Error { error: String },
    Data(serde_json::Value),
}

impl ToolResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }
}

/// Per-tool results of a routed step, keyed by tool name in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutputs(Vec<(String, ToolResult)>);

impl ToolOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, tool: impl Into<String>, result: ToolResult) {
        self.0.push((tool.into(), result));
    }

    pub fn get(&self, tool: &str) -> Option<&ToolResult> {
        self.0
            .iter()
            .find(|(name, _)| name == tool)
            .map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolResult)> {
        self.0.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ToolOutputs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, result)| (name, result)))
    }
}

/// What a step produced: generated text or a map of tool results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Text(String),
    Tools(ToolOutputs),
}

impl StepOutput {
    /// Textual representation appended to the execution context.
    pub fn summary(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Tools(outputs) => serde_json::to_string(outputs)
                .unwrap_or_else(|err| format!("<unserializable tool output: {err}>")),
        }
    }
}

/// Result of executing one plan step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// Whether the step was carried out. For routed steps this reflects routing
    /// only; individual tool failures live in the per-tool payloads.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    pub tool_used: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn generated(text: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(StepOutput::Text(text.into())),
            tool_used: None,
            error: None,
        }
    }

    pub fn routed(outputs: ToolOutputs) -> Self {
        Self {
            success: true,
            tool_used: Some(outputs.names()),
            output: Some(StepOutput::Tools(outputs)),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            tool_used: None,
            error: Some(error.into()),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.output {
            Some(StepOutput::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn tool_outputs(&self) -> Option<&ToolOutputs> {
        match &self.output {
            Some(StepOutput::Tools(outputs)) => Some(outputs),
            _ => None,
        }
    }
}

/// Free-form self-audit text. The orchestrator never parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuditReport(String);

impl AuditReport {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every planned step was executed.
    Completed,
    /// The plan had more steps than `max_iterations`; the rest never ran.
    Truncated {
        planned: usize,
        max_iterations: usize,
    },
    /// The run was cancelled before every planned step finished.
    Cancelled { planned: usize },
}

/// Terminal artifact of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub goal: String,
    /// Set when the plan is the single-step fallback.
    pub plan_fallback: bool,
    /// Steps that were actually executed, in order.
    pub steps: Vec<PlanStep>,
    /// One result per executed step, index-aligned with `steps`.
    pub outputs: Vec<StepResult>,
    pub audit: AuditReport,
    pub status: RunStatus,
    pub success: bool,
    pub final_context: String,
    pub started_at: String,
    pub ended_at: String,
}

impl RunReport {
    pub fn is_truncated(&self) -> bool {
        matches!(self.status, RunStatus::Truncated { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled { .. })
    }
}

/// Overall success: every executed step succeeded and the plan ran to the end.
pub fn overall_success(outputs: &[StepResult], status: RunStatus) -> bool {
    status == RunStatus::Completed && outputs.iter().all(|result| result.success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn process_output_serializes_to_sandbox_schema() {
        let output = ToolResult::Process(ProcessOutput {
            stdout: "ok\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
        });
        assert_eq!(
            serde_json::to_value(&output).expect("serialize"),
            json!({"stdout": "ok\n", "stderr": "", "exit_code": 0})
        );
    }

    #[test]
    fn error_result_serializes_to_single_field() {
        let result = ToolResult::error("Tool 'x' not registered");
        assert_eq!(
            serde_json::to_value(&result).expect("serialize"),
            json!({"error": "Tool 'x' not registered"})
        );
        assert_eq!(result.error_message(), Some("Tool 'x' not registered"));
    }

    #[test]
    fn untagged_results_deserialize_to_matching_variant() {
        let process: ToolResult =
            serde_json::from_value(json!({"stdout": "", "stderr": "boom", "exit_code": 2}))
                .expect("process");
        assert!(matches!(process, ToolResult::Process(ref out) if out.exit_code == 2));

        let error: ToolResult = serde_json::from_value(json!({"error": "nope"})).expect("error");
        assert!(error.is_error());

        let data: ToolResult = serde_json::from_value(json!({"rows": 3})).expect("data");
        assert!(matches!(data, ToolResult::Data(_)));
    }

    #[test]
    fn sentinels_distinguish_forced_termination() {
        let timed_out = ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: TIMEOUT_EXIT_CODE,
        };
        assert!(timed_out.timed_out());
        assert!(!timed_out.cancelled());
        assert!(!timed_out.success());
    }

    #[test]
    fn tool_outputs_serialize_as_map_in_declaration_order() {
        let mut outputs = ToolOutputs::new();
        outputs.push("shell", ToolResult::error("later"));
        outputs.push("code_executor", ToolResult::error("first?"));
        let rendered = StepOutput::Tools(outputs).summary();
        let shell = rendered.find("\"shell\"").expect("shell key");
        let code = rendered.find("\"code_executor\"").expect("code key");
        assert!(shell < code, "declaration order preserved: {rendered}");
    }

    #[test]
    fn routed_result_records_tools_used() {
        let mut outputs = ToolOutputs::new();
        outputs.push("web_fetch", ToolResult::error("offline"));
        let result = StepResult::routed(outputs);
        assert!(result.success);
        assert_eq!(result.tool_used, Some(vec!["web_fetch".to_string()]));
        assert!(result.text().is_none());
        assert!(
            result
                .tool_outputs()
                .and_then(|outputs| outputs.get("web_fetch"))
                .is_some_and(ToolResult::is_error)
        );
    }

    #[test]
    fn overall_success_requires_completed_status() {
        let outputs = vec![StepResult::generated("a"), StepResult::generated("b")];
        assert!(overall_success(&outputs, RunStatus::Completed));
        assert!(!overall_success(
            &outputs,
            RunStatus::Truncated {
                planned: 5,
                max_iterations: 2
            }
        ));

        let mixed = vec![StepResult::generated("a"), StepResult::failed("engine down")];
        assert!(!overall_success(&mixed, RunStatus::Completed));
    }
}
