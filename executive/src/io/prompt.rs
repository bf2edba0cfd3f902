//! Prompt rendering for the planner, step and audit calls.
//!
//! Templates are embedded at compile time and split into sections by
//! `<!-- section:KEY required|droppable -->` markers. When a rendered prompt
//! exceeds the byte budget, droppable sections go first (least useful first)
//! and the last remaining section is cut as a final resort.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::context::ExecutionContext;
use crate::core::text::truncate_bytes;
use crate::core::types::{PlanStep, ToolDescription};

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const STEP_TEMPLATE: &str = include_str!("prompts/step.md");
const AUDIT_TEMPLATE: &str = include_str!("prompts/audit.md");

/// Sections removed, in this order, when a prompt is over budget.
const DROP_ORDER: [&str; 4] = ["example", "tools", "steps", "context"];

const TRUNCATED_SUFFIX: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should compile")
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    key: String,
    required: bool,
    /// Section content without its marker.
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<Section> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(Section {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[Section]) -> usize {
    let separators = sections.len().saturating_sub(1) * 2;
    sections.iter().map(|s| s.content.len()).sum::<usize>() + separators
}

fn apply_budget(sections: &mut Vec<Section>, budget: usize) {
    if total_len(sections) <= budget {
        return;
    }

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped = sections.remove(idx);
            debug!(
                section = key,
                bytes_dropped = dropped.content.len(),
                "dropped section for budget"
            );
        }
    }

    let total = total_len(sections);
    let Some(last) = sections.last_mut() else {
        return;
    };
    if total <= budget {
        return;
    }
    let before_len = last.content.len();
    let allowed = budget.saturating_sub(total - before_len);
    if allowed > TRUNCATED_SUFFIX.len() {
        let kept = truncate_bytes(&last.content, allowed - TRUNCATED_SUFFIX.len()).len();
        last.content.truncate(kept);
        last.content.push_str(TRUNCATED_SUFFIX);
    } else {
        let kept = truncate_bytes(&last.content, allowed).len();
        last.content.truncate(kept);
    }
    debug!(
        section = %last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders budgeted prompts from the embedded templates.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
    context_budget_bytes: usize,
}

impl PromptBuilder {
    /// `budget_bytes` bounds a whole prompt; `context_budget_bytes` bounds the
    /// execution context embedded in it (the newest part is kept).
    pub fn new(budget_bytes: usize, context_budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("plan", PLAN_TEMPLATE)
            .context("load plan template")?;
        env.add_template("step", STEP_TEMPLATE)
            .context("load step template")?;
        env.add_template("audit", AUDIT_TEMPLATE)
            .context("load audit template")?;
        Ok(Self {
            env,
            budget_bytes,
            context_budget_bytes,
        })
    }

    pub fn plan(&self, goal: &str, tools: &[ToolDescription]) -> Result<String> {
        let rendered = self
            .env
            .get_template("plan")?
            .render(context! {
                goal => goal.trim(),
                tools => tools,
            })
            .context("render plan prompt")?;
        Ok(self.finish(&rendered))
    }

    pub fn step(&self, step: &PlanStep, execution: &ExecutionContext) -> Result<String> {
        let rendered = self
            .env
            .get_template("step")?
            .render(context! {
                step => step,
                context => self.context_tail(execution),
            })
            .context("render step prompt")?;
        Ok(self.finish(&rendered))
    }

    pub fn audit(
        &self,
        goal: &str,
        steps: &[PlanStep],
        execution: &ExecutionContext,
    ) -> Result<String> {
        let rendered = self
            .env
            .get_template("audit")?
            .render(context! {
                goal => goal.trim(),
                steps => steps,
                context => self.context_tail(execution),
            })
            .context("render audit prompt")?;
        Ok(self.finish(&rendered))
    }

    fn context_tail(&self, execution: &ExecutionContext) -> Option<String> {
        let tail = execution.render_tail(self.context_budget_bytes);
        (!tail.trim().is_empty()).then_some(tail)
    }

    fn finish(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }
}
