//! Semantic plan invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::types::PlanStep;

/// Check semantic invariants not expressible in JSON Schema:
/// - Step numbers are exactly `1..=N` in order (no duplicates, no gaps)
/// - Descriptions are not blank
/// - Tool names are not blank
pub fn validate_plan_invariants(steps: &[PlanStep]) -> Vec<String> {
    let mut errors = Vec::new();
    if steps.is_empty() {
        errors.push("plan must contain at least one step".to_string());
    }

    let mut seen = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        let expected = index + 1;
        if !seen.insert(step.number) {
            errors.push(format!("duplicate step number {}", step.number));
        }
        if usize::try_from(step.number).ok() != Some(expected) {
            errors.push(format!(
                "step at position {expected} is numbered {} (expected {expected})",
                step.number
            ));
        }
        if step.description.trim().is_empty() {
            errors.push(format!("step {}: description must not be blank", step.number));
        }
        if step.required_tools.iter().any(|tool| tool.trim().is_empty()) {
            errors.push(format!("step {}: tool names must not be blank", step.number));
        }
    }
    errors
}
