//! Name-based dispatch to registered tools.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::instrument;

use super::{Tool, ToolContext};
use crate::core::types::{ToolDescription, ToolResult};
use crate::observer::{Observer, ToolOutcome};

/// Immutable registry from tool name to tool.
///
/// [`ToolExecutor::run`] never fails: missing tools, errors and panics all come
/// back as [`ToolResult::Error`], and every call is reported to the observer.
pub struct ToolExecutor {
    tools: BTreeMap<String, Tool>,
    observer: Arc<dyn Observer>,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ToolExecutor {
    /// Later registrations under the same name replace earlier ones.
    pub fn new(
        tools: impl IntoIterator<Item = (String, Tool)>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            tools: tools.into_iter().collect(),
            observer,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolDescription {
                name: name.clone(),
                summary: tool.summary().to_string(),
            })
            .collect()
    }

    #[instrument(skip_all, fields(tool = name))]
    pub fn run(&self, name: &str, input: &str, ctx: &ToolContext<'_>) -> ToolResult {
        let result = match self.tools.get(name) {
            None => ToolResult::error(format!("Tool '{name}' not registered")),
            Some(tool) => match catch_unwind(AssertUnwindSafe(|| tool.run(input, ctx))) {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => ToolResult::error(format!("{err:#}")),
                Err(panic) => ToolResult::error(format!("tool panicked: {}", panic_message(&*panic))),
            },
        };

        let outcome = match result.error_message() {
            Some(error) => ToolOutcome::Failed { error },
            None => ToolOutcome::Succeeded,
        };
        self.observer.tool_invoked(name, &outcome);
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::test_support::{FailingTool, PanickingTool, RecordedEvent, RecordingObserver, StaticTool};
    use serde_json::json;

    fn executor(observer: &Arc<RecordingObserver>) -> ToolExecutor {
        ToolExecutor::new(
            vec![
                (
                    "echo".to_string(),
                    Tool::custom("echoes", StaticTool::new(ToolResult::Data(json!({"ok": true})))),
                ),
                ("broken".to_string(), Tool::custom("fails", FailingTool::new("disk on fire"))),
                ("panics".to_string(), Tool::custom("panics", PanickingTool)),
            ],
            observer.clone(),
        )
    }

    fn run(executor: &ToolExecutor, name: &str) -> ToolResult {
        let cancel = CancelToken::new();
        executor.run(
            name,
            "input",
            &ToolContext {
                context: "",
                cancel: &cancel,
            },
        )
    }

    #[test]
    fn missing_tool_returns_not_registered_error() {
        let observer = Arc::new(RecordingObserver::default());
        let result = run(&executor(&observer), "nonexistent_tool");
        assert_eq!(
            result.error_message(),
            Some("Tool 'nonexistent_tool' not registered")
        );
        assert_eq!(
            observer.events(),
            vec![RecordedEvent::Tool {
                name: "nonexistent_tool".to_string(),
                error: Some("Tool 'nonexistent_tool' not registered".to_string()),
            }]
        );
    }

    #[test]
    fn error_and_panic_become_error_results() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = executor(&observer);

        let failed = run(&executor, "broken");
        assert_eq!(failed.error_message(), Some("disk on fire"));

        let panicked = run(&executor, "panics");
        let message = panicked.error_message().expect("error");
        assert!(message.contains("tool panicked"), "{message}");

        assert_eq!(observer.tool_events().len(), 2);
    }

    #[test]
    fn success_is_logged_once() {
        let observer = Arc::new(RecordingObserver::default());
        let result = run(&executor(&observer), "echo");
        assert_eq!(result, ToolResult::Data(json!({"ok": true})));
        assert_eq!(
            observer.tool_events(),
            vec![RecordedEvent::Tool {
                name: "echo".to_string(),
                error: None,
            }]
        );
    }

    #[test]
    fn describe_lists_tools_by_name() {
        let observer = Arc::new(RecordingObserver::default());
        let executor = executor(&observer);
        let names: Vec<_> = executor.describe().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["broken", "echo", "panics"]);
        assert!(executor.contains("echo"));
        assert!(!executor.contains("shell"));
    }
}
