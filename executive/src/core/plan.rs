//! Parsing of engine planning responses into validated plans.
//!
//! The engine is asked for a JSON array of steps. Responses are accepted when
//! they are the bare array, an object wrapping it under `steps`, or either of
//! those inside a fenced code block. Anything else is rejected so the caller
//! can substitute the fallback plan.

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use regex::Regex;
use serde_json::Value;

use crate::core::invariants::validate_plan_invariants;
use crate::core::types::PlanStep;

pub const PLAN_SCHEMA: &str = include_str!("../../../schemas/plan/v1.schema.json");

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("fence regex should be valid")
});

/// A plan plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    /// Why the fallback was used; `None` for an engine-produced plan.
    pub fallback_reason: Option<String>,
}

impl Plan {
    pub fn generated(steps: Vec<PlanStep>) -> Self {
        Self {
            steps,
            fallback_reason: None,
        }
    }

    /// Single-step plan whose description is the goal itself.
    pub fn fallback(goal: &str, reason: impl Into<String>) -> Self {
        Self {
            steps: vec![PlanStep::fallback(goal)],
            fallback_reason: Some(reason.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Parse and validate a planning response: schema conformance + numbering invariants.
pub fn parse_plan(response: &str) -> Result<Vec<PlanStep>> {
    let payload = extract_json_payload(response);
    let value = match serde_json::from_str(payload).context("parse plan json")? {
        Value::Object(mut map) => map
            .remove("steps")
            .ok_or_else(|| anyhow!("plan object has no `steps` array"))?,
        other => other,
    };

    validate_schema(&value)?;
    let mut steps: Vec<PlanStep> =
        serde_json::from_value(value).context("deserialize plan steps")?;
    for step in &mut steps {
        dedupe_tools(&mut step.required_tools);
    }

    let errors = validate_plan_invariants(&steps);
    if !errors.is_empty() {
        bail!("plan invariant violations:\n- {}", errors.join("\n- "));
    }
    Ok(steps)
}

/// Strip code fences and surrounding prose, returning the JSON candidate.
fn extract_json_payload(response: &str) -> &str {
    let trimmed = response.trim();
    if let Some(inner) = FENCE_RE.captures(trimmed).and_then(|caps| caps.get(1)) {
        return inner.as_str().trim();
    }
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return trimmed;
    }
    match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Validate JSON instance against the plan schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile plan schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("plan schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Required tools form a set; keep the first occurrence of each name.
fn dedupe_tools(tools: &mut Vec<String>) {
    let mut seen = HashSet::new();
    tools.retain(|tool| seen.insert(tool.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"[
      {"number": 1, "description": "Fetch data", "required_tools": ["web_fetch"], "expected_output": "JSON"},
      {"number": 2, "description": "Summarize", "expected_output": "Text"}
    ]"#;

    #[test]
    fn parses_bare_array() {
        let steps = parse_plan(VALID).expect("plan");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].required_tools, vec!["web_fetch".to_string()]);
        assert!(steps[1].required_tools.is_empty());
        let numbers: Vec<u32> = steps.iter().map(|step| step.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn parses_fenced_and_wrapped_responses() {
        let fenced = format!("Here is the plan:\n```json\n{VALID}\n```\nGood luck.");
        assert_eq!(parse_plan(&fenced).expect("fenced").len(), 2);

        let wrapped = format!("{{\"steps\": {VALID}}}");
        assert_eq!(parse_plan(&wrapped).expect("wrapped").len(), 2);

        let prose = format!("Sure! {VALID} Let me know.");
        assert_eq!(parse_plan(&prose).expect("prose").len(), 2);
    }

    #[test]
    fn duplicate_tools_collapse_to_first_occurrence() {
        let raw = r#"[{"number": 1, "description": "d", "required_tools": ["shell", "code_executor", "shell"], "expected_output": ""}]"#;
        let steps = parse_plan(raw).expect("plan");
        assert_eq!(
            steps[0].required_tools,
            vec!["shell".to_string(), "code_executor".to_string()]
        );
    }

    #[test]
    fn rejects_unparsable_and_invalid_plans() {
        assert!(parse_plan("I cannot help with that.").is_err());
        assert!(parse_plan("[]").is_err());
        assert!(parse_plan(r#"[{"number": 1, "description": "no expected output"}]"#).is_err());
        assert!(parse_plan(r#"{"plan": []}"#).is_err());

        let gap = r#"[
          {"number": 1, "description": "a", "expected_output": ""},
          {"number": 3, "description": "b", "expected_output": ""}
        ]"#;
        let err = parse_plan(gap).unwrap_err();
        assert!(format!("{err:#}").contains("invariant"));
    }

    #[test]
    fn fallback_plan_wraps_goal_in_single_step() {
        let plan = Plan::fallback("print hi", "unparsable");
        assert!(plan.is_fallback());
        assert_eq!(plan.steps, vec![PlanStep::fallback("print hi")]);
        assert_eq!(plan.steps[0].expected_output, "Completion");
    }
}
