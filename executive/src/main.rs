//! Command-line driver for the task agent.
//!
//! `executive run "<goal>"` plans, executes and audits one goal against a
//! local generation engine and a Docker sandbox, then prints the run report.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use executive::core::cancel::CancelToken;
use executive::core::types::{RunReport, RunStatus, ToolResult};
use executive::exit_codes;
use executive::io::config::{AgentConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use executive::io::engine::CommandGenerator;
use executive::io::memory::{JsonlMemoryStore, remember_run};
use executive::io::sandbox::SandboxRunner;
use executive::io::sandbox::docker::DockerBackend;
use executive::logging;
use executive::observer::{Observer, TracingObserver};
use executive::orchestrator::{Orchestrator, OrchestratorConfig};
use executive::tools::{CodeExecTool, ShellTool, ToolContext, ToolExecutor, builtin_tools};

#[derive(Parser)]
#[command(
    name = "executive",
    version,
    about = "Autonomous task agent: plan, execute in a sandbox, self-audit"
)]
struct Cli {
    /// Log progress at info level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan, execute and audit a goal, then print the run report.
    Run {
        goal: String,
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Override `max_iterations` from the config.
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run one script in the sandbox and print its output as JSON.
    Sandbox {
        file: PathBuf,
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Treat the file as a shell script instead of Python.
        #[arg(long)]
        shell: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Run {
            goal,
            config,
            max_iterations,
            json,
        } => cmd_run(&goal, &config, max_iterations, json),
        Command::Sandbox {
            file,
            config,
            shell,
        } => cmd_sandbox(&file, &config, shell),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &AgentConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(goal: &str, config_path: &Path, max_iterations: Option<usize>, json: bool) -> Result<i32> {
    if goal.trim().is_empty() {
        bail!("goal must not be empty");
    }
    let mut config = load_config(config_path)?;
    if let Some(max_iterations) = max_iterations {
        config.max_iterations = max_iterations;
        config.validate()?;
    }

    let observer: Arc<dyn Observer> = Arc::new(TracingObserver);
    let sandbox = sandbox_runner(&config);
    let tools = builtin_tools(
        &config.tools,
        &sandbox,
        &config.sandbox.interpreter,
        &config.sandbox.shell,
    )?;
    let executor = Arc::new(ToolExecutor::new(tools, observer.clone()));
    let engine = CommandGenerator::from_config(&config.engine)?;
    let orchestrator = Orchestrator::new(
        engine,
        executor,
        observer,
        OrchestratorConfig::from(&config),
    )?;

    let report = orchestrator.run(goal)?;

    if let Some(path) = &config.memory.path {
        remember_run(&JsonlMemoryStore::new(path), &report);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize run report")?
        );
    } else {
        print!("{}", render_report(&report));
    }
    Ok(report_exit_code(&report))
}

fn cmd_sandbox(file: &Path, config_path: &Path, shell: bool) -> Result<i32> {
    let config = load_config(config_path)?;
    let source =
        fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let sandbox = sandbox_runner(&config);
    let cancel = CancelToken::new();
    let ctx = ToolContext {
        context: "",
        cancel: &cancel,
    };

    let result = if shell {
        ShellTool::new(sandbox, config.sandbox.shell.clone()).run(&source, &ctx)?
    } else {
        CodeExecTool::new(sandbox, config.sandbox.interpreter.clone()).run(&source, &ctx)?
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("serialize sandbox result")?
    );
    Ok(match &result {
        ToolResult::Process(output) if output.success() => exit_codes::OK,
        ToolResult::Process(_) => exit_codes::FAILED,
        _ => exit_codes::INVALID,
    })
}

fn sandbox_runner(config: &AgentConfig) -> SandboxRunner {
    let backend = Arc::new(DockerBackend::from_config(&config.sandbox));
    let runner = SandboxRunner::new(backend, config.sandbox.spec());
    match &config.sandbox.scratch_dir {
        Some(dir) => runner.with_scratch_dir(dir),
        None => runner,
    }
}

fn report_exit_code(report: &RunReport) -> i32 {
    if report.is_truncated() || report.is_cancelled() {
        exit_codes::INCOMPLETE
    } else if report.success {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    }
}

/// Human-readable report for the terminal.
fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    let status = match report.status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Truncated {
            planned,
            max_iterations,
        } => format!("truncated ({max_iterations} of {planned} steps)"),
        RunStatus::Cancelled { planned } => {
            format!("cancelled ({} of {planned} steps)", report.steps.len())
        }
    };
    out.push_str(&format!("Run {}: {status}\n", report.run_id));
    out.push_str(&format!("Goal: {}\n", report.goal));
    if report.plan_fallback {
        out.push_str("(planning failed; ran the goal as a single step)\n");
    }
    for (step, result) in report.steps.iter().zip(&report.outputs) {
        let mark = if result.success { "ok" } else { "FAILED" };
        out.push_str(&format!("\n[{mark}] Step {}: {}\n", step.number, step.description));
        if let Some(output) = &result.output {
            out.push_str(&format!("{}\n", output.summary()));
        }
        if let Some(error) = &result.error {
            out.push_str(&format!("error: {error}\n"));
        }
    }
    out.push_str(&format!("\nAudit:\n{}\n", report.audit.as_str()));
    out.push_str(&format!("\nSuccess: {}\n", report.success));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use executive::core::types::{AuditReport, StepResult};
    use executive::test_support::step;

    fn report(status: RunStatus, outputs: Vec<StepResult>) -> RunReport {
        let steps = (1..=outputs.len())
            .map(|n| step(u32::try_from(n).expect("small"), &format!("do {n}"), &[]))
            .collect();
        let success = status == RunStatus::Completed && outputs.iter().all(|o| o.success);
        RunReport {
            run_id: "20260101T000000Z-abc123".to_string(),
            goal: "goal".to_string(),
            plan_fallback: false,
            steps,
            outputs,
            audit: AuditReport::new("- yes\n- no\n- yes"),
            status,
            success,
            final_context: String::new(),
            started_at: String::new(),
            ended_at: String::new(),
        }
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from(["executive", "run", "Compute 2+2", "--max-iterations", "3", "--json"]);
        match cli.command {
            Command::Run {
                goal,
                max_iterations,
                json,
                config,
            } => {
                assert_eq!(goal, "Compute 2+2");
                assert_eq!(max_iterations, Some(3));
                assert!(json);
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_FILE));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["executive", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn exit_code_reflects_run_status() {
        let ok = report(RunStatus::Completed, vec![StepResult::generated("4")]);
        assert_eq!(report_exit_code(&ok), exit_codes::OK);

        let failed = report(RunStatus::Completed, vec![StepResult::failed("engine down")]);
        assert_eq!(report_exit_code(&failed), exit_codes::FAILED);

        let truncated = report(
            RunStatus::Truncated {
                planned: 5,
                max_iterations: 1,
            },
            vec![StepResult::generated("a")],
        );
        assert_eq!(report_exit_code(&truncated), exit_codes::INCOMPLETE);
    }

    #[test]
    fn text_report_lists_steps_and_audit() {
        let rendered = render_report(&report(
            RunStatus::Completed,
            vec![StepResult::generated("4"), StepResult::failed("engine down")],
        ));
        assert!(rendered.contains("[ok] Step 1: do 1\n4\n"));
        assert!(rendered.contains("[FAILED] Step 2: do 2\nerror: engine down"));
        assert!(rendered.contains("Audit:\n- yes"));
        assert!(rendered.contains("Success: false"));
    }

    #[test]
    fn text_report_marks_fallback_and_cancellation() {
        let mut cancelled = report(
            RunStatus::Cancelled { planned: 3 },
            vec![StepResult::generated("partial")],
        );
        cancelled.plan_fallback = true;

        let rendered = render_report(&cancelled);

        assert!(rendered.starts_with("Run 20260101T000000Z-abc123: cancelled (1 of 3 steps)\nGoal: goal\n"));
        assert!(rendered.contains("(planning failed; ran the goal as a single step)\n"));
        assert!(rendered.ends_with("\nSuccess: false\n"));
        assert_eq!(report_exit_code(&cancelled), exit_codes::INCOMPLETE);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        assert_eq!(cmd_init(&path, false).expect("init"), exit_codes::OK);
        assert!(cmd_init(&path, false).is_err());
        assert_eq!(cmd_init(&path, true).expect("force"), exit_codes::OK);
        assert_eq!(load_config(&path).expect("load"), AgentConfig::default());
    }
}
