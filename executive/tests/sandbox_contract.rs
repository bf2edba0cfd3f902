//! Sandbox contract checks through the public tool surface.
//!
//! Uses the in-process backend from `test_support`, which runs commands on the
//! host inside the private working directory. What is checked here is the
//! runner's side of the contract: fresh environments, timeouts, teardown.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use executive::core::cancel::CancelToken;
use executive::core::types::{ProcessOutput, ToolResult};
use executive::io::sandbox::{SandboxCommand, SandboxResult, SandboxRunner, SandboxSpec};
use executive::observer::NoopObserver;
use executive::test_support::{LocalBackend, local_sandbox};
use executive::tools::{CodeExecTool, Tool, ToolContext, ToolExecutor};

fn run_tool(executor: &ToolExecutor, name: &str, input: &str) -> ToolResult {
    let cancel = CancelToken::new();
    executor.run(
        name,
        input,
        &ToolContext {
            context: "",
            cancel: &cancel,
        },
    )
}

/// A script printing "ok" yields exactly the sandbox result schema, and a
/// second invocation gets a brand-new environment.
#[test]
fn code_tool_reports_output_and_never_reuses_environment() {
    let (backend, sandbox) = local_sandbox(Duration::from_secs(10));
    // `sh` stands in for the Python interpreter so the test needs no Python.
    let tool = CodeExecTool::new(sandbox, vec!["sh".to_string()]);
    let executor = ToolExecutor::new(
        vec![("code_executor".to_string(), Tool::CodeExecution(tool))],
        Arc::new(NoopObserver),
    );

    let first = run_tool(&executor, "code_executor", "```python\nprintf 'ok\\n'\n```");
    let second = run_tool(&executor, "code_executor", "echo ok");

    let expected = ToolResult::Process(ProcessOutput {
        stdout: "ok\n".to_string(),
        stderr: String::new(),
        exit_code: 0,
    });
    assert_eq!(first, expected);
    assert_eq!(second, expected);
    assert_eq!(
        serde_json::to_value(&first).expect("json"),
        serde_json::json!({"stdout": "ok\n", "stderr": "", "exit_code": 0})
    );

    let envs = backend.provisioned();
    assert_eq!(envs.len(), 2);
    assert_ne!(envs[0].id, envs[1].id);
    assert_ne!(envs[0].workdir, envs[1].workdir);
    for env in &envs {
        assert_eq!(backend.destroy_calls(&env.id), 1);
        assert!(!env.workdir.exists());
    }
}

#[test]
fn timeout_is_bounded_and_distinguished_from_exit() {
    let timeout = Duration::from_millis(500);
    let (backend, sandbox) = local_sandbox(timeout);

    let started = Instant::now();
    let result = sandbox.run(
        &SandboxCommand::new(vec!["sleep".to_string(), "30".to_string()]),
        &CancelToken::new(),
    );
    let elapsed = started.elapsed();

    let SandboxResult::Completed(output) = result else {
        panic!("expected completion, got {result:?}");
    };
    assert!(output.timed_out());
    assert!(!output.success());
    assert!(
        elapsed < timeout + Duration::from_secs(3),
        "returned after {elapsed:?}"
    );
    assert_eq!(backend.outstanding(), 0);

    let exited = sandbox.run(
        &SandboxCommand::new(vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()]),
        &CancelToken::new(),
    );
    let SandboxResult::Completed(exited) = exited else {
        panic!("expected completion");
    };
    assert_eq!(exited.exit_code, 1);
    assert!(!exited.timed_out());
}

#[test]
fn provisioning_fault_becomes_error_result() {
    let backend = Arc::new(LocalBackend::failing_provision("pull access denied for python"));
    let sandbox = SandboxRunner::new(backend.clone(), SandboxSpec::default());
    let executor = ToolExecutor::new(
        vec![(
            "code_executor".to_string(),
            Tool::CodeExecution(CodeExecTool::new(sandbox, vec!["python".to_string()])),
        )],
        Arc::new(NoopObserver),
    );

    let result = run_tool(&executor, "code_executor", "print('ok')");

    let message = result.error_message().expect("error result");
    assert!(message.contains("provision sandbox"), "{message}");
    assert!(message.contains("pull access denied"), "{message}");
    assert!(backend.provisioned().is_empty());
}

#[test]
fn concurrent_invocations_share_nothing() {
    let (backend, sandbox) = local_sandbox(Duration::from_secs(10));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let sandbox = sandbox.clone();
            std::thread::spawn(move || {
                let command = SandboxCommand::new(vec!["sh".to_string(), "marker.sh".to_string()])
                    .with_file("marker.sh", format!("ls; echo {i} > mine.txt; cat mine.txt"));
                sandbox.run(&command, &CancelToken::new())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let SandboxResult::Completed(output) = handle.join().expect("thread") else {
            panic!("expected completion");
        };
        assert_eq!(output.stdout, format!("marker.sh\n{i}\n"));
    }
    assert_eq!(backend.provisioned().len(), 4);
    assert_eq!(backend.outstanding(), 0);
}
