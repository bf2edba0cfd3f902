//! Tool capabilities and the registry that dispatches to them.
//!
//! The set of built-in tools is closed ([`Tool`]); anything else plugs in as
//! [`Tool::Custom`] behind the [`Capability`] trait. Tools that execute code or
//! commands always go through the [`SandboxRunner`].

pub mod code_exec;
pub mod executor;
pub mod shell;
pub mod web_fetch;

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Result, bail};
use regex::Regex;

use crate::core::cancel::CancelToken;
use crate::core::types::ToolResult;
use crate::io::config::ToolsConfig;
use crate::io::sandbox::SandboxRunner;

pub use code_exec::CodeExecTool;
pub use executor::ToolExecutor;
pub use shell::ShellTool;
pub use web_fetch::WebFetchTool;

pub const CODE_EXECUTOR: &str = "code_executor";
pub const SHELL: &str = "shell";
pub const WEB_FETCH: &str = "web_fetch";

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```")
        .expect("fence regex should compile")
});

/// Shared state a tool may consult while running.
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    /// Rendered execution context of the run so far.
    pub context: &'a str,
    pub cancel: &'a CancelToken,
}

/// Uniform tool contract.
///
/// Implementations interpret `input` themselves. Returning `Err` (or
/// panicking) is a fault; the [`ToolExecutor`] converts it to an error result.
pub trait Capability: Send + Sync {
    fn run(&self, input: &str, ctx: &ToolContext<'_>) -> Result<ToolResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    CodeExecution,
    ShellExecution,
    WebFetch,
    Custom,
}

pub enum Tool {
    CodeExecution(CodeExecTool),
    ShellExecution(ShellTool),
    WebFetch(WebFetchTool),
    Custom {
        summary: String,
        capability: Box<dyn Capability>,
    },
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("kind", &self.kind())
            .field("summary", &self.summary())
            .finish()
    }
}

impl Tool {
    pub fn custom(summary: impl Into<String>, capability: impl Capability + 'static) -> Self {
        Self::Custom {
            summary: summary.into(),
            capability: Box::new(capability),
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::CodeExecution(_) => ToolKind::CodeExecution,
            Self::ShellExecution(_) => ToolKind::ShellExecution,
            Self::WebFetch(_) => ToolKind::WebFetch,
            Self::Custom { .. } => ToolKind::Custom,
        }
    }

    /// One-line description shown to the planner.
    pub fn summary(&self) -> &str {
        match self {
            Self::CodeExecution(_) => {
                "Runs a Python script in an isolated sandbox without network access"
            }
            Self::ShellExecution(_) => {
                "Runs a shell command in an isolated sandbox without network access"
            }
            Self::WebFetch(_) => "Fetches the first http(s) URL in the input and returns the page body",
            Self::Custom { summary, .. } => summary,
        }
    }

    pub fn run(&self, input: &str, ctx: &ToolContext<'_>) -> Result<ToolResult> {
        match self {
            Self::CodeExecution(tool) => tool.run(input, ctx),
            Self::ShellExecution(tool) => tool.run(input, ctx),
            Self::WebFetch(tool) => tool.run(input, ctx),
            Self::Custom { capability, .. } => capability.run(input, ctx),
        }
    }
}

/// Body of the first fenced block whose language tag is in `langs` (or untagged).
pub fn fenced_block<'a>(input: &'a str, langs: &[&str]) -> Option<&'a str> {
    FENCE_RE.captures_iter(input).find_map(|caps| {
        let lang = caps.get(1).map_or("", |m| m.as_str());
        let accepted = lang.is_empty() || langs.iter().any(|l| l.eq_ignore_ascii_case(lang));
        accepted.then(|| caps.get(2).map_or("", |m| m.as_str()))
    })
}

/// Source code carried by `input`: a matching fenced block, else the whole input.
fn script_from(input: &str, langs: &[&str]) -> Option<String> {
    let body = fenced_block(input, langs).unwrap_or(input).trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Instantiate the enabled built-in tools.
pub fn builtin_tools(
    config: &ToolsConfig,
    sandbox: &SandboxRunner,
    interpreter: &[String],
    shell: &str,
) -> Result<Vec<(String, Tool)>> {
    let mut tools = Vec::with_capacity(config.enabled.len());
    for name in &config.enabled {
        let tool = match name.as_str() {
            CODE_EXECUTOR => Tool::CodeExecution(CodeExecTool::new(
                sandbox.clone(),
                interpreter.to_vec(),
            )),
            SHELL => Tool::ShellExecution(ShellTool::new(sandbox.clone(), shell)),
            WEB_FETCH => Tool::WebFetch(WebFetchTool::new(
                Duration::from_secs(config.web_fetch.timeout_secs),
                config.web_fetch.max_bytes,
            )?),
            other => bail!("unknown tool in tools.enabled: {other}"),
        };
        tools.push((name.clone(), tool));
    }
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sandbox::SandboxSpec;
    use crate::test_support::LocalBackend;
    use std::sync::Arc;

    #[test]
    fn fenced_block_prefers_matching_language() {
        let input = "Run this:\n```json\n{}\n```\nthen\n```python\nprint(4)\n```\n";
        assert_eq!(fenced_block(input, &["python", "py"]), Some("print(4)\n"));
    }

    #[test]
    fn untagged_fence_is_accepted() {
        let input = "```\necho hi\n```";
        assert_eq!(fenced_block(input, &["sh"]), Some("echo hi\n"));
    }

    #[test]
    fn script_falls_back_to_whole_input() {
        assert_eq!(script_from("  print(1)  ", &["python"]), Some("print(1)".to_string()));
        assert_eq!(script_from("   ", &["python"]), None);
    }

    #[test]
    fn builtin_tools_follow_enabled_order() {
        let sandbox = SandboxRunner::new(Arc::new(LocalBackend::new()), SandboxSpec::default());
        let config = ToolsConfig {
            enabled: vec![SHELL.to_string(), CODE_EXECUTOR.to_string()],
            ..ToolsConfig::default()
        };
        let tools = builtin_tools(&config, &sandbox, &["python".to_string()], "/bin/sh")
            .expect("tools");
        let kinds: Vec<_> = tools.iter().map(|(name, tool)| (name.as_str(), tool.kind())).collect();
        assert_eq!(
            kinds,
            vec![(SHELL, ToolKind::ShellExecution), (CODE_EXECUTOR, ToolKind::CodeExecution)]
        );
    }

    #[test]
    fn unknown_builtin_is_rejected() {
        let sandbox = SandboxRunner::new(Arc::new(LocalBackend::new()), SandboxSpec::default());
        let config = ToolsConfig {
            enabled: vec!["teleport".to_string()],
            ..ToolsConfig::default()
        };
        let err = builtin_tools(&config, &sandbox, &["python".to_string()], "/bin/sh").unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }
}
