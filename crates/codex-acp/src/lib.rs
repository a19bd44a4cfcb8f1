//! # codex-acp - Agent Client Protocol agent for Codex
//!
//! Speaks ACP (JSON-RPC 2.0, one frame per line) to an editor and drives the
//! Codex CLI underneath. Prompts become Codex turns; Codex's item events
//! come back as `session/update` notifications.
//!
//! ## Module Organization
//!
//! - `transport`: the ACP connection and the session update queue
//! - `agent`: sessions and the per-prompt turn controller
//! - `backend`: the thread/turn abstraction and the Codex event model
//! - `codex_exec`: backend that runs `codex exec --experimental-json`
//! - `dispatch`: Codex items to ACP session updates
//! - `slash`: slash command registry, built-ins and custom prompt files
//! - `prompts`, `template`, `tokenizer`: prompt file loading and expansion
//! - `render`: flattening ACP content blocks into prompt text
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use codex_acp::{serve, AgentOptions, CodexAgent, CodexExec, ExecConfig, Outbox};
//!
//! # async fn example() -> codex_acp::Result<()> {
//! let (outbox, updates) = Outbox::channel();
//! let agent = Arc::new(CodexAgent::new(
//!     Arc::new(CodexExec::new(ExecConfig::default())),
//!     Arc::new(outbox),
//!     AgentOptions::default(),
//! ));
//! serve(agent, updates, tokio::io::stdin(), tokio::io::stdout()).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod backend;
pub mod clock;
pub mod codex_exec;
pub mod delta;
pub mod dispatch;
pub mod error;
pub mod notifier;
pub mod prompts;
pub mod render;
pub mod slash;
pub mod template;
pub mod tokenizer;
pub mod transport;

pub use agent::{AgentOptions, CodexAgent, Session};
pub use backend::{Backend, EventStream, Thread, ThreadEvent, ThreadItem, ThreadOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codex_exec::{CodexExec, ExecConfig};
pub use error::{AcpError, BackendError, ExpansionError, Result};
pub use notifier::SessionNotifier;
pub use slash::{SlashCommandRegistry, REFRESH_INTERVAL};
pub use transport::{serve, Outbox, UpdateQueue, SHUTDOWN_GRACE};
