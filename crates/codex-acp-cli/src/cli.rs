use clap::Parser;
use codex_acp_config::{ConfigLayer, LogLevel, SandboxMode};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "codex-acp")]
#[command(about = "Agent Client Protocol adapter for the Codex CLI, speaking JSON-RPC on stdio")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to ~/.config/codex-acp/config.toml)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Default model for new sessions
    #[arg(short, long)]
    pub model: Option<String>,

    /// API base URL passed to Codex as OPENAI_BASE_URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key passed to Codex as CODEX_API_KEY
    #[arg(long)]
    pub api_key: Option<String>,

    /// Sandbox policy (read-only, workspace-write, danger-full-access)
    #[arg(long)]
    pub sandbox: Option<SandboxMode>,

    /// Allow running outside a git repository
    #[arg(long, overrides_with = "no_skip_git_check")]
    pub skip_git_check: bool,

    #[arg(long, overrides_with = "skip_git_check", hide = true)]
    pub no_skip_git_check: bool,

    /// Stream command executions and offer /test
    #[arg(long, overrides_with = "no_allow_commands")]
    pub allow_commands: bool,

    /// Hide command executions and drop /test
    #[arg(long, overrides_with = "allow_commands")]
    pub no_allow_commands: bool,

    /// Stream reasoning as thought chunks
    #[arg(long, overrides_with = "no_send_reasoning")]
    pub send_reasoning: bool,

    /// Do not stream reasoning
    #[arg(long, overrides_with = "send_reasoning")]
    pub no_send_reasoning: bool,

    /// Log level (silent, error, warn, info, debug); RUST_LOG takes precedence
    #[arg(short = 'l', long)]
    pub log_level: Option<LogLevel>,

    /// Path to the codex executable
    #[arg(long)]
    pub codex_bin: Option<PathBuf>,

    /// Directory with custom prompt files; pass "" to disable
    #[arg(long)]
    pub prompts_dir: Option<String>,
}

/// Collapse a `--flag`/`--no-flag` pair; neither given means unset
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Cli {
    /// The highest-precedence config layer
    pub fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            sandbox: self.sandbox,
            skip_git_check: switch(self.skip_git_check, self.no_skip_git_check),
            allow_commands: switch(self.allow_commands, self.no_allow_commands),
            send_reasoning: switch(self.send_reasoning, self.no_send_reasoning),
            log_level: self.log_level,
            codex_path: self.codex_bin.clone(),
            prompts_dir: self.prompts_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_means_empty_layer() {
        let cli = Cli::parse_from(["codex-acp"]);
        assert_eq!(cli.layer(), ConfigLayer::default());
    }

    #[test]
    fn test_flags_map_onto_layer() {
        let cli = Cli::parse_from([
            "codex-acp",
            "--model",
            "gpt-5-codex",
            "--sandbox",
            "read-only",
            "--skip-git-check",
            "--no-allow-commands",
            "--log-level",
            "debug",
            "--codex-bin",
            "/opt/codex",
            "--prompts-dir",
            "",
        ]);
        let layer = cli.layer();

        assert_eq!(layer.model.as_deref(), Some("gpt-5-codex"));
        assert_eq!(layer.sandbox, Some(SandboxMode::ReadOnly));
        assert_eq!(layer.skip_git_check, Some(true));
        assert_eq!(layer.allow_commands, Some(false));
        assert_eq!(layer.send_reasoning, None);
        assert_eq!(layer.log_level, Some(LogLevel::Debug));
        assert_eq!(layer.codex_path, Some(PathBuf::from("/opt/codex")));
        assert_eq!(layer.prompts_dir.as_deref(), Some(""));
    }

    #[test]
    fn test_last_switch_wins() {
        let cli = Cli::parse_from(["codex-acp", "--no-send-reasoning", "--send-reasoning"]);
        assert_eq!(cli.layer().send_reasoning, Some(true));

        let cli = Cli::parse_from(["codex-acp", "--send-reasoning", "--no-send-reasoning"]);
        assert_eq!(cli.layer().send_reasoning, Some(false));
    }

    #[test]
    fn test_invalid_sandbox_is_rejected() {
        assert!(Cli::try_parse_from(["codex-acp", "--sandbox", "yolo"]).is_err());
    }
}
