//! Docker-backed isolation.
//!
//! Each environment is a throwaway container created with networking disabled,
//! a memory ceiling without extra swap, a process limit and all capabilities
//! dropped. Staged files are copied in with `docker cp` rather than bind
//! mounted, so nothing the container writes ends up on the host.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use super::{Environment, IsolationBackend, SandboxCommand, SandboxSpec};
use crate::core::cancel::CancelToken;
use crate::io::config::SandboxConfig;
use crate::io::ids::short_id;
use crate::io::process::{CommandOutput, RunLimits, Termination, run_command};

/// Working directory inside the container.
pub const WORKSPACE_DIR: &str = "/workspace";

const CONTAINER_PREFIX: &str = "executive";
const CONTROL_OUTPUT_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct DockerBackend {
    docker: String,
    image: String,
    /// Budget for short control commands (`create`, `cp`, `rm`).
    control_timeout: Duration,
    /// Budget for pulling a missing image.
    pull_timeout: Duration,
}

impl DockerBackend {
    pub fn new(docker: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
            image: image.into(),
            control_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(10 * 60),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.docker.clone(), config.image.clone())
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    fn docker(
        &self,
        args: &[String],
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.docker);
        cmd.args(args);
        let limits = RunLimits {
            timeout,
            output_limit_bytes: CONTROL_OUTPUT_LIMIT,
        };
        let verb = args.first().map_or("docker", String::as_str);
        run_command(cmd, None, &limits, cancel).with_context(|| format!("run docker {verb}"))
    }

    fn checked(
        &self,
        args: &[String],
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<String> {
        let output = self.docker(args, timeout, cancel)?;
        let verb = args.first().map_or("docker", String::as_str);
        match output.termination {
            Termination::TimedOut => bail!("docker {verb} timed out after {timeout:?}"),
            Termination::Cancelled => bail!("docker {verb} cancelled"),
            Termination::Exited => {}
        }
        if !output.status.success() {
            bail!(
                "docker {verb} failed with status {}: {}",
                output.exit_code(),
                output.stderr_lossy().trim()
            );
        }
        Ok(output.stdout_lossy().trim().to_string())
    }

    #[instrument(skip_all, fields(image = %self.image))]
    fn ensure_image(&self, cancel: &CancelToken) -> Result<()> {
        let inspect = self.docker(
            &strings(&["image", "inspect", "--format", "{{.Id}}", self.image.as_str()]),
            self.control_timeout,
            Some(cancel),
        )?;
        if inspect.termination == Termination::Cancelled {
            bail!("docker image inspect cancelled");
        }
        if inspect.status.success() {
            return Ok(());
        }
        info!("image missing locally, pulling");
        self.checked(
            &strings(&["pull", self.image.as_str()]),
            self.pull_timeout,
            Some(cancel),
        )
        .with_context(|| format!("pull image {}", self.image))?;
        Ok(())
    }

    /// Force-remove a container by id or name. A missing container is not an error.
    ///
    /// Ignores cancellation so cleanup still runs after the caller gave up.
    fn remove(&self, target: &str) -> Result<()> {
        let output = self.docker(
            &strings(&["rm", "--force", target]),
            self.control_timeout,
            None,
        )?;
        if output.timed_out() {
            bail!("docker rm timed out after {:?}", self.control_timeout);
        }
        if output.status.success() {
            return Ok(());
        }
        let stderr = output.stderr_lossy();
        if stderr.contains("No such container") {
            return Ok(());
        }
        bail!(
            "docker rm failed with status {}: {}",
            output.exit_code(),
            stderr.trim()
        )
    }

    fn remove_quietly(&self, target: &str) {
        if let Err(err) = self.remove(target) {
            warn!(container = %target, err = %format!("{err:#}"), "cleanup after failed provisioning");
        }
    }
}

impl IsolationBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    #[instrument(skip_all, fields(image = %self.image))]
    fn provision(
        &self,
        spec: &SandboxSpec,
        workdir: &std::path::Path,
        command: &SandboxCommand,
        cancel: &CancelToken,
    ) -> Result<Environment> {
        self.ensure_image(cancel)?;

        let name = format!("{CONTAINER_PREFIX}-{}", short_id());
        let args = create_args(&name, &self.image, spec, &command.argv);
        // A killed or failed `docker create` may still leave a container
        // behind; only its name is known at this point.
        let id = match self.checked(&args, self.control_timeout, Some(cancel)) {
            Ok(id) if !id.is_empty() => id,
            Ok(_) => {
                self.remove_quietly(&name);
                bail!("docker create returned no container id");
            }
            Err(err) => {
                self.remove_quietly(&name);
                return Err(err.context("create container"));
            }
        };
        debug!(container = %id, name = %name, "container created");

        let env = Environment {
            id,
            workdir: workdir.to_path_buf(),
            argv: command.argv.clone(),
        };

        // Trailing "/." copies the directory contents, not the directory itself.
        let source = format!("{}/.", workdir.display());
        let target = format!("{}:{WORKSPACE_DIR}", env.id);
        if let Err(err) = self
            .checked(
                &strings(&["cp", source.as_str(), target.as_str()]),
                self.control_timeout,
                Some(cancel),
            )
            .context("copy staged files into container")
        {
            self.remove_quietly(&env.id);
            return Err(err);
        }
        Ok(env)
    }

    fn attach(&self, env: &Environment) -> Command {
        let mut cmd = Command::new(&self.docker);
        cmd.args(["start", "--attach", env.id.as_str()]);
        cmd
    }

    fn destroy(&self, env: &Environment) -> Result<()> {
        self.remove(&env.id)
    }
}

/// Arguments for `docker create` with every isolation flag applied.
pub fn create_args(name: &str, image: &str, spec: &SandboxSpec, argv: &[String]) -> Vec<String> {
    let mut args = strings(&[
        "create",
        "--name",
        name,
        "--network",
        "none",
        "--cap-drop",
        "ALL",
        "--security-opt",
        "no-new-privileges",
    ]);
    args.push(format!("--memory={}b", spec.memory_limit_bytes));
    args.push(format!("--memory-swap={}b", spec.memory_limit_bytes));
    args.push(format!("--pids-limit={}", spec.pids_limit));
    args.extend(strings(&["-w", WORKSPACE_DIR, image]));
    args.extend(argv.iter().cloned());
    args
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| (*arg).to_string()).collect()
}
