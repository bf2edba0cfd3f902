//! Generation engine boundary.
//!
//! The [`Generator`] trait decouples orchestration from the actual text
//! generation backend. The only shipped backend, [`CommandGenerator`], runs a
//! configured command once per call; tests use scripted generators that return
//! predetermined text without spawning processes.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::options::GenerationOptions;
use crate::io::config::EngineConfig;
use crate::io::process::{RunLimits, run_command};

/// Environment variable carrying [`GenerationOptions::temperature`].
pub const TEMPERATURE_ENV: &str = "EXECUTIVE_TEMPERATURE";
/// Environment variable carrying [`GenerationOptions::max_tokens`].
pub const MAX_TOKENS_ENV: &str = "EXECUTIVE_MAX_TOKENS";
/// Environment variable carrying [`GenerationOptions::stop`] as a JSON array.
pub const STOP_ENV: &str = "EXECUTIVE_STOP";

/// Abstraction over text generation backends.
///
/// One call is one synchronous, single-shot generation. Implementations must
/// not retry; retry policy belongs to whoever wraps the generator.
pub trait Generator {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

impl<G: Generator + ?Sized> Generator for &G {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        (**self).generate(prompt, options)
    }
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        (**self).generate(prompt, options)
    }
}

/// Generator that spawns a local command per call.
///
/// The prompt is written to the command's stdin and the completion is read
/// from its stdout. Options are exported as `EXECUTIVE_*` environment variables.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn new(argv: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("engine command must be a non-empty array");
        }
        Ok(Self {
            argv,
            timeout,
            output_limit_bytes,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        )
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(program = %self.argv[0], max_tokens = options.max_tokens))]
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        info!(prompt_bytes = prompt.len(), "invoking generation engine");

        let stop = serde_json::to_string(&options.stop).context("serialize stop sequences")?;
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..])
            .env(TEMPERATURE_ENV, options.temperature.to_string())
            .env(MAX_TOKENS_ENV, options.max_tokens.to_string())
            .env(STOP_ENV, stop);

        let limits = RunLimits {
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        let output =
            run_command(cmd, Some(prompt.as_bytes()), &limits, None).context("run engine")?;

        if output.timed_out() {
            warn!(timeout_secs = self.timeout.as_secs(), "engine timed out");
            return Err(anyhow!("engine timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = output.exit_code(), "engine failed");
            return Err(anyhow!(
                "engine failed with status {}: {}",
                output.exit_code(),
                output.stderr_lossy().trim()
            ));
        }
        if output.stdout_truncated > 0 {
            warn!(
                truncated = output.stdout_truncated,
                "engine output exceeded limit"
            );
        }

        let text = output.stdout_lossy().trim().to_string();
        debug!(completion_bytes = text.len(), "engine completed");
        Ok(text)
    }
}
