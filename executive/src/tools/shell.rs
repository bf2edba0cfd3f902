//! Shell command execution inside the sandbox.

use anyhow::Result;
use tracing::instrument;

use super::{ToolContext, script_from};
use crate::core::types::ToolResult;
use crate::io::sandbox::{SandboxCommand, SandboxRunner};

const LANGS: &[&str] = &["sh", "bash", "shell", "console"];

#[derive(Debug, Clone)]
pub struct ShellTool {
    sandbox: SandboxRunner,
    shell: String,
}

impl ShellTool {
    pub fn new(sandbox: SandboxRunner, shell: impl Into<String>) -> Self {
        Self {
            sandbox,
            shell: shell.into(),
        }
    }

    #[instrument(skip_all, name = "shell")]
    pub fn run(&self, input: &str, ctx: &ToolContext<'_>) -> Result<ToolResult> {
        let Some(script) = script_from(input, LANGS) else {
            return Ok(ToolResult::error("no command to execute"));
        };
        let command = SandboxCommand::new(vec![self.shell.clone(), "-c".to_string(), script]);
        Ok(self.sandbox.run(&command, ctx.cancel).into())
    }
}
