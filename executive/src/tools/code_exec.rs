//! Python code execution inside the sandbox.

use anyhow::Result;
use tracing::{debug, instrument};

use super::{ToolContext, script_from};
use crate::core::types::ToolResult;
use crate::io::sandbox::{SandboxCommand, SandboxRunner};

/// File the script is staged as, relative to the working directory.
pub const SCRIPT_NAME: &str = "script.py";

const LANGS: &[&str] = &["python", "py", "python3"];

#[derive(Debug, Clone)]
pub struct CodeExecTool {
    sandbox: SandboxRunner,
    interpreter: Vec<String>,
}

impl CodeExecTool {
    pub fn new(sandbox: SandboxRunner, interpreter: Vec<String>) -> Self {
        Self {
            sandbox,
            interpreter,
        }
    }

    #[instrument(skip_all, name = "code_executor")]
    pub fn run(&self, input: &str, ctx: &ToolContext<'_>) -> Result<ToolResult> {
        let Some(script) = script_from(input, LANGS) else {
            return Ok(ToolResult::error("no code to execute"));
        };
        debug!(script_bytes = script.len(), "staging script");

        let mut argv = self.interpreter.clone();
        argv.push(SCRIPT_NAME.to_string());
        let command = SandboxCommand::new(argv).with_file(SCRIPT_NAME, script);
        Ok(self.sandbox.run(&command, ctx.cancel).into())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::io::sandbox::SandboxSpec;
    use crate::test_support::LocalBackend;
    use std::sync::Arc;

    fn tool(backend: &Arc<LocalBackend>) -> CodeExecTool {
        let sandbox = SandboxRunner::new(backend.clone(), SandboxSpec::default());
        CodeExecTool::new(sandbox, vec!["sh".to_string()])
    }

    #[test]
    fn fenced_script_runs_in_sandbox() {
        let backend = Arc::new(LocalBackend::new());
        let cancel = CancelToken::new();
        let ctx = ToolContext {
            context: "",
            cancel: &cancel,
        };

        let result = tool(&backend)
            .run("Print it:\n```python\necho ok\n```", &ctx)
            .expect("run");

        match result {
            ToolResult::Process(output) => {
                assert_eq!(output.stdout, "ok\n");
                assert_eq!(output.exit_code, 0);
            }
            other => panic!("expected process output, got {other:?}"),
        }
        let provisioned = backend.provisioned();
        assert_eq!(provisioned[0].argv, vec!["sh".to_string(), SCRIPT_NAME.to_string()]);
    }

    #[test]
    fn empty_input_is_an_error_result() {
        let backend = Arc::new(LocalBackend::new());
        let cancel = CancelToken::new();
        let ctx = ToolContext {
            context: "",
            cancel: &cancel,
        };
        let result = tool(&backend).run("  \n", &ctx).expect("run");
        assert_eq!(result.error_message(), Some("no code to execute"));
        assert!(backend.provisioned().is_empty());
    }
}
