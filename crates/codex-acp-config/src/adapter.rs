//! Resolved adapter configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Sandbox policy forwarded to the Codex CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// The agent may read files but not modify them
    ReadOnly,
    /// The agent may write inside the working directory
    WorkspaceWrite,
    /// No sandboxing at all
    DangerFullAccess,
}

impl SandboxMode {
    /// Value as passed to `codex exec --sandbox`
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }
}

impl std::fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "read-only" => Ok(SandboxMode::ReadOnly),
            "workspace-write" => Ok(SandboxMode::WorkspaceWrite),
            "danger-full-access" => Ok(SandboxMode::DangerFullAccess),
            _ => Err(ConfigError::InvalidSandbox(s.to_string())),
        }
    }
}

/// Adapter log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No log output
    Silent,
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Everything, including per-event traces
    Debug,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "silent" => Ok(LogLevel::Silent),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

/// How to reach the Codex backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodexConnection {
    /// API base URL override (exported as `OPENAI_BASE_URL`)
    pub base_url: Option<String>,

    /// Explicit API key (exported as `CODEX_API_KEY`)
    pub api_key: Option<String>,

    /// Custom `codex` executable
    pub path_override: Option<PathBuf>,
}

/// Fully resolved adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Default model for new threads
    pub model: Option<String>,

    /// Sandbox policy; `None` leaves the Codex default in place
    pub sandbox_mode: Option<SandboxMode>,

    /// Skip the Codex "must run inside a git repository" guard
    pub skip_git_repo_check: bool,

    /// Stream command execution items and enable `/test`
    pub allow_commands: bool,

    /// Stream reasoning items as thought chunks
    pub send_reasoning: bool,

    /// Adapter log verbosity
    pub log_level: LogLevel,

    /// Directory scanned for custom slash command prompts
    pub prompts_dir: Option<PathBuf>,

    /// Backend connection settings
    pub codex: CodexConnection,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            model: None,
            sandbox_mode: None,
            skip_git_repo_check: false,
            allow_commands: true,
            send_reasoning: true,
            log_level: LogLevel::Info,
            prompts_dir: default_prompts_dir(),
            codex: CodexConnection::default(),
        }
    }
}

/// Default prompts directory: `~/.codex/prompts`
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".codex").join("prompts"))
}
