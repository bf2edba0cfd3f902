//! Agent configuration stored in `executive.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::options::GenerationProfiles;
use crate::io::sandbox::SandboxSpec;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "executive.toml";

/// Smallest context budget that still leaves room for content after the
/// truncation marker.
pub const MIN_CONTEXT_BUDGET_BYTES: usize = 64;

/// Agent configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that work with a local Docker daemon and a local engine command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on executed steps per run.
    pub max_iterations: usize,

    /// Maximum bytes for a rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,

    /// Maximum bytes of execution context embedded in a prompt (newest kept).
    pub context_budget_bytes: usize,

    pub generation: GenerationProfiles,
    pub engine: EngineConfig,
    pub sandbox: SandboxConfig,
    pub tools: ToolsConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Command that reads a prompt on stdin and prints the completion.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate engine stdout beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "ollama".to_string(),
                "run".to_string(),
                "qwen2.5:7b-instruct".to_string(),
            ],
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Docker CLI binary.
    pub docker: String,
    pub image: String,
    pub memory_mb: u64,
    pub pids_limit: u32,
    /// Wall-clock budget per sandboxed invocation.
    pub timeout_secs: u64,
    /// Interpreter argv used by the code execution tool.
    pub interpreter: Vec<String>,
    /// Shell used by the shell tool.
    pub shell: String,
    /// Parent directory for private working directories (system temp dir if unset).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            image: "python:3.11-slim".to_string(),
            memory_mb: 512,
            pids_limit: 128,
            timeout_secs: 30,
            interpreter: vec!["python".to_string()],
            shell: "/bin/sh".to_string(),
            scratch_dir: None,
        }
    }
}

impl SandboxConfig {
    pub fn spec(&self) -> SandboxSpec {
        SandboxSpec {
            memory_limit_bytes: self.memory_mb * 1024 * 1024,
            pids_limit: self.pids_limit,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Built-in tools to register, by name.
    pub enabled: Vec<String>,
    pub web_fetch: WebFetchConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "code_executor".to_string(),
                "shell".to_string(),
                "web_fetch".to_string(),
            ],
            web_fetch: WebFetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebFetchConfig {
    pub timeout_secs: u64,
    /// Page bodies are cut after this many bytes.
    pub max_bytes: usize,
}

impl Default for WebFetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_bytes: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryConfig {
    /// JSONL file that receives one record per finished run. Disabled when unset.
    pub path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            prompt_budget_bytes: 40_000,
            context_budget_bytes: 16_000,
            generation: GenerationProfiles::default(),
            engine: EngineConfig::default(),
            sandbox: SandboxConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.context_budget_bytes < MIN_CONTEXT_BUDGET_BYTES {
            return Err(anyhow!(
                "context_budget_bytes must be >= {MIN_CONTEXT_BUDGET_BYTES}"
            ));
        }
        if let Some(violation) = self.generation.violations().into_iter().next() {
            return Err(anyhow!(violation));
        }
        if self.engine.command.is_empty() || self.engine.command[0].trim().is_empty() {
            return Err(anyhow!("engine.command must be a non-empty array"));
        }
        if self.engine.timeout_secs == 0 {
            return Err(anyhow!("engine.timeout_secs must be > 0"));
        }
        if self.engine.output_limit_bytes == 0 {
            return Err(anyhow!("engine.output_limit_bytes must be > 0"));
        }
        if self.sandbox.image.trim().is_empty() {
            return Err(anyhow!("sandbox.image must not be empty"));
        }
        if self.sandbox.memory_mb == 0 {
            return Err(anyhow!("sandbox.memory_mb must be > 0"));
        }
        if self.sandbox.pids_limit == 0 {
            return Err(anyhow!("sandbox.pids_limit must be > 0"));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.interpreter.is_empty() || self.sandbox.interpreter[0].trim().is_empty() {
            return Err(anyhow!("sandbox.interpreter must be a non-empty array"));
        }
        if self.tools.web_fetch.timeout_secs == 0 {
            return Err(anyhow!("tools.web_fetch.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
