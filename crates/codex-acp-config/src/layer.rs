//! Partial configuration layers and their resolution

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::adapter::{default_prompts_dir, AdapterConfig, CodexConnection, LogLevel, SandboxMode};
use crate::error::{ConfigError, ConfigResult};

/// One source of configuration values; unset fields defer to lower layers
///
/// The TOML file form uses the same field names:
///
/// ```toml
/// model = "gpt-5-codex"
/// sandbox = "workspace-write"
/// allow_commands = false
/// prompts_dir = "~/.codex/prompts"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    /// Default model
    pub model: Option<String>,
    /// API base URL
    pub base_url: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Sandbox mode
    pub sandbox: Option<SandboxMode>,
    /// Skip the git repository guard
    pub skip_git_check: Option<bool>,
    /// Stream command execution updates
    pub allow_commands: Option<bool>,
    /// Stream reasoning updates
    pub send_reasoning: Option<bool>,
    /// Log verbosity
    pub log_level: Option<LogLevel>,
    /// Custom `codex` executable
    pub codex_path: Option<PathBuf>,
    /// Raw prompts directory; an empty string disables prompt discovery
    pub prompts_dir: Option<String>,
}

impl ConfigLayer {
    /// Read the `CODEX_*` variables from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_env_vars(std::env::vars())
    }

    /// Build a layer from an explicit set of environment variables
    pub fn from_env_vars<I, K, V>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut layer = Self::default();
        let mut path_override = None;
        let mut bin = None;

        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                "CODEX_MODEL" => layer.model = Some(value),
                "CODEX_BASE_URL" => layer.base_url = Some(value),
                "CODEX_API_KEY" => layer.api_key = Some(value),
                "CODEX_SANDBOX" => layer.sandbox = parse_optional_sandbox(&value)?,
                "CODEX_SKIP_GIT_CHECK" => layer.skip_git_check = Some(parse_bool(&value)?),
                "CODEX_ALLOW_COMMANDS" => layer.allow_commands = Some(parse_bool(&value)?),
                "CODEX_SEND_REASONING" => layer.send_reasoning = Some(parse_bool(&value)?),
                "CODEX_LOG_LEVEL" => layer.log_level = parse_optional_log_level(&value)?,
                "CODEX_PATH_OVERRIDE" => path_override = Some(PathBuf::from(value)),
                "CODEX_BIN" => bin = Some(PathBuf::from(value)),
                "CODEX_PROMPTS_DIR" => layer.prompts_dir = Some(value),
                _ => {}
            }
        }

        layer.codex_path = path_override.or(bin);
        Ok(layer)
    }

    /// Load a TOML config file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the default config file if it exists
    pub fn from_default_file() -> ConfigResult<Self> {
        match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Stack `upper` on top of `self`; values set in `upper` win
    pub fn overlay(self, upper: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            model: upper.model.or(self.model),
            base_url: upper.base_url.or(self.base_url),
            api_key: upper.api_key.or(self.api_key),
            sandbox: upper.sandbox.or(self.sandbox),
            skip_git_check: upper.skip_git_check.or(self.skip_git_check),
            allow_commands: upper.allow_commands.or(self.allow_commands),
            send_reasoning: upper.send_reasoning.or(self.send_reasoning),
            log_level: upper.log_level.or(self.log_level),
            codex_path: upper.codex_path.or(self.codex_path),
            prompts_dir: upper.prompts_dir.or(self.prompts_dir),
        }
    }

    /// Apply defaults and normalize paths
    pub fn resolve(self) -> AdapterConfig {
        let defaults = AdapterConfig::default();
        let prompts_dir = match self.prompts_dir {
            Some(raw) => normalize_path(&raw),
            None => default_prompts_dir(),
        };

        AdapterConfig {
            model: self.model,
            sandbox_mode: self.sandbox,
            skip_git_repo_check: self.skip_git_check.unwrap_or(defaults.skip_git_repo_check),
            allow_commands: self.allow_commands.unwrap_or(defaults.allow_commands),
            send_reasoning: self.send_reasoning.unwrap_or(defaults.send_reasoning),
            log_level: self.log_level.unwrap_or(defaults.log_level),
            prompts_dir,
            codex: CodexConnection {
                base_url: self.base_url,
                api_key: self.api_key,
                path_override: self.codex_path,
            },
        }
    }
}

/// Default config file: `$XDG_CONFIG_HOME/codex-acp/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("codex-acp").join("config.toml"))
}

/// Parse `true/1/yes` or `false/0/no`, case-insensitively
pub fn parse_bool(raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean(raw.to_string())),
    }
}

fn parse_optional_sandbox(raw: &str) -> ConfigResult<Option<SandboxMode>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some)
}

fn parse_optional_log_level(raw: &str) -> ConfigResult<Option<LogLevel>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some)
}

/// Trim, expand a leading `~/`, and make the path absolute
///
/// Returns `None` for blank input.
pub fn normalize_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let expanded = match (trimmed.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if trimmed == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(trimmed)),
        _ => PathBuf::from(trimmed),
    };

    if expanded.is_absolute() {
        return Some(expanded);
    }

    match std::env::current_dir() {
        Ok(cwd) => Some(cwd.join(expanded)),
        Err(_) => Some(expanded),
    }
}
