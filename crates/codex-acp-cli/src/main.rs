// codex-acp - Agent Client Protocol adapter for the Codex CLI
//
// Reads ACP frames on stdin, writes responses and session updates on
// stdout, and logs to stderr. Runs until stdin closes.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use codex_acp::{serve, AgentOptions, CodexAgent, CodexExec, ExecConfig, Outbox};
use codex_acp_config::{AdapterConfig, ConfigLayer, LogLevel};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(config.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting codex-acp");
    debug!(
        model = ?config.model,
        sandbox = ?config.sandbox_mode,
        prompts_dir = ?config.prompts_dir,
        allow_commands = config.allow_commands,
        send_reasoning = config.send_reasoning,
        "configuration loaded"
    );

    let backend = CodexExec::new(ExecConfig::from(&config.codex));
    let (outbox, updates) = Outbox::channel();
    let agent = Arc::new(CodexAgent::new(
        Arc::new(backend),
        Arc::new(outbox),
        AgentOptions::from(&config),
    ));

    serve(agent, updates, tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("ACP connection failed")?;

    info!("input closed, shutting down");
    Ok(())
}

/// Defaults < config file < environment < flags
fn load_config(cli: &Cli) -> Result<AdapterConfig> {
    let file = match &cli.config {
        Some(path) => ConfigLayer::from_file(path)?,
        None => ConfigLayer::from_default_file()?,
    };
    let env = ConfigLayer::from_env().context("invalid CODEX_* environment")?;

    Ok(file.overlay(env).overlay(cli.layer()).resolve())
}

/// Log to stderr; stdout carries the protocol. RUST_LOG overrides the level.
fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}
