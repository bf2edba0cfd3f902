//! Live checks against a local Docker daemon.
//!
//! Excluded from regular runs because they need Docker and pull images.
//!
//! Run with: `cargo test --test investigation_docker -- --ignored`

use std::sync::Arc;
use std::time::{Duration, Instant};

use executive::core::cancel::CancelToken;
use executive::core::types::ToolResult;
use executive::io::sandbox::docker::DockerBackend;
use executive::io::sandbox::{SandboxCommand, SandboxResult, SandboxRunner, SandboxSpec};
use executive::tools::{CodeExecTool, ToolContext};

const IMAGE: &str = "python:3.11-slim";

fn runner(timeout: Duration) -> SandboxRunner {
    SandboxRunner::new(
        Arc::new(DockerBackend::new("docker", IMAGE)),
        SandboxSpec {
            timeout,
            ..SandboxSpec::default()
        },
    )
}

fn python(sandbox: &SandboxRunner, source: &str) -> ToolResult {
    let cancel = CancelToken::new();
    CodeExecTool::new(sandbox.clone(), vec!["python".to_string()])
        .run(
            source,
            &ToolContext {
                context: "",
                cancel: &cancel,
            },
        )
        .expect("tool")
}

#[test]
#[ignore]
fn python_script_prints_ok() {
    let result = python(&runner(Duration::from_secs(60)), "print('ok')");
    match result {
        ToolResult::Process(output) => {
            assert_eq!(output.stdout, "ok\n");
            assert_eq!(output.exit_code, 0);
        }
        other => panic!("expected process output, got {other:?}"),
    }
}

#[test]
#[ignore]
fn network_is_unreachable() {
    let script = "import socket\ntry:\n    socket.create_connection(('1.1.1.1', 53), timeout=3)\n    print('reachable')\nexcept OSError:\n    print('unreachable')\n";
    let result = python(&runner(Duration::from_secs(60)), script);
    let ToolResult::Process(output) = result else {
        panic!("expected process output, got {result:?}");
    };
    assert_eq!(output.stdout.trim(), "unreachable");
}

#[test]
#[ignore]
fn files_do_not_survive_between_invocations() {
    let sandbox = runner(Duration::from_secs(60));
    python(&sandbox, "open('left.txt', 'w').write('x')");
    let result = python(&sandbox, "import os\nprint(os.path.exists('left.txt'))");
    let ToolResult::Process(output) = result else {
        panic!("expected process output, got {result:?}");
    };
    assert_eq!(output.stdout.trim(), "False");
}

#[test]
#[ignore]
fn runaway_script_is_killed_at_timeout() {
    let sandbox = runner(Duration::from_secs(3));
    let started = Instant::now();
    let result = sandbox.run(
        &SandboxCommand::new(vec!["python".to_string(), "-c".to_string(), "while True: pass".to_string()]),
        &CancelToken::new(),
    );
    let SandboxResult::Completed(output) = result else {
        panic!("expected completion, got {result:?}");
    };
    assert!(output.timed_out());
    assert!(started.elapsed() < Duration::from_secs(30));
}
