//! Append-only execution context owned by a single run.

use crate::core::text::tail_bytes;
use crate::core::types::StepResult;

const TRUNCATED_MARKER: &str = "[earlier context truncated]\n";

/// Ordered textual summaries of the steps executed so far.
///
/// The context visible to step `i + 1` is exactly the summaries of steps
/// `1..=i`; entries are never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    entries: Vec<String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, summary: String) {
        self.entries.push(summary);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Full context, one entry per line.
    pub fn render(&self) -> String {
        self.entries.join("\n")
    }

    /// Most recent part of the context that fits in `budget_bytes`.
    ///
    /// Whole entries are kept from the end; if even the newest entry does not
    /// fit, its tail is kept. A marker line is prepended whenever anything was
    /// cut and the budget has room for it. The result never exceeds the budget.
    pub fn render_tail(&self, budget_bytes: usize) -> String {
        let full = self.render();
        if full.len() <= budget_bytes {
            return full;
        }
        if budget_bytes <= TRUNCATED_MARKER.len() {
            return tail_bytes(&full, budget_bytes).to_string();
        }
        let budget = budget_bytes.saturating_sub(TRUNCATED_MARKER.len());

        let mut kept: Vec<&str> = Vec::new();
        let mut used = 0usize;
        for entry in self.entries.iter().rev() {
            let needed = entry.len() + usize::from(!kept.is_empty());
            if used + needed > budget {
                break;
            }
            used += needed;
            kept.push(entry);
        }

        let body = if kept.is_empty() {
            let newest = self.entries.last().map(String::as_str).unwrap_or_default();
            tail_bytes(newest, budget).to_string()
        } else {
            kept.reverse();
            kept.join("\n")
        };
        format!("{TRUNCATED_MARKER}{body}")
    }
}

/// Context line recorded for a finished step.
pub fn step_summary(number: u32, result: &StepResult) -> String {
    match (&result.output, &result.error) {
        (Some(output), _) => format!("Step {number} Output: {}", output.summary()),
        (None, Some(error)) => format!("Step {number} Error: {error}"),
        (None, None) => format!("Step {number} Output: "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_of(entries: &[&str]) -> ExecutionContext {
        let mut context = ExecutionContext::new();
        for entry in entries {
            context.append((*entry).to_string());
        }
        context
    }

    #[test]
    fn render_joins_entries_in_order() {
        let context = context_of(&["Step 1 Output: a", "Step 2 Output: b"]);
        assert_eq!(context.render(), "Step 1 Output: a\nStep 2 Output: b");
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn render_tail_keeps_newest_whole_entries() {
        let context = context_of(&[&"x".repeat(100), "Step 2 Output: keep me"]);
        let tail = context.render_tail(60);
        assert!(tail.starts_with(TRUNCATED_MARKER));
        assert!(tail.ends_with("Step 2 Output: keep me"));
        assert!(!tail.contains("xxx"));
        assert!(tail.len() <= 60);
    }

    #[test]
    fn render_tail_cuts_oversized_newest_entry() {
        let context = context_of(&[&format!("Step 1 Output: {}", "y".repeat(200))]);
        let tail = context.render_tail(50);
        assert!(tail.starts_with(TRUNCATED_MARKER));
        assert!(tail.len() <= 50);
        assert!(tail.ends_with('y'));
    }

    #[test]
    fn render_tail_never_exceeds_budget_smaller_than_marker() {
        let context = context_of(&["Step 1 Output: first", "Step 2 Output: second"]);
        for budget in [0, 1, 10, TRUNCATED_MARKER.len()] {
            let tail = context.render_tail(budget);
            assert!(tail.len() <= budget, "budget {budget}: {tail:?}");
        }
        assert_eq!(context.render_tail(6), "second");
    }

    #[test]
    fn failed_steps_are_summarized_with_their_error() {
        let summary = step_summary(3, &StepResult::failed("engine unavailable"));
        assert_eq!(summary, "Step 3 Error: engine unavailable");
        let summary = step_summary(1, &StepResult::generated("hi"));
        assert_eq!(summary, "Step 1 Output: hi");
    }
}
