//! Codex thread/turn abstraction and its event model
//!
//! Events mirror the JSON lines printed by `codex exec --experimental-json`.
//! Kinds this agent does not understand deserialize to `Unknown` variants
//! and are skipped, so newer Codex releases keep working.

use async_trait::async_trait;
use codex_acp_config::SandboxMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::BackendError;

/// One line of the Codex event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadEvent {
    #[serde(rename = "thread.started")]
    ThreadStarted { thread_id: String },
    #[serde(rename = "turn.started")]
    TurnStarted,
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<Usage>,
    },
    #[serde(rename = "turn.failed")]
    TurnFailed { error: ThreadError },
    #[serde(rename = "item.started")]
    ItemStarted { item: ThreadItem },
    #[serde(rename = "item.updated")]
    ItemUpdated { item: ThreadItem },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: ThreadItem },
    /// Unrecoverable stream error reported by Codex itself
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(other)]
    Unknown,
}

impl ThreadEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ThreadEvent::ThreadStarted { .. } => "thread.started",
            ThreadEvent::TurnStarted => "turn.started",
            ThreadEvent::TurnCompleted { .. } => "turn.completed",
            ThreadEvent::TurnFailed { .. } => "turn.failed",
            ThreadEvent::ItemStarted { .. } => "item.started",
            ThreadEvent::ItemUpdated { .. } => "item.updated",
            ThreadEvent::ItemCompleted { .. } => "item.completed",
            ThreadEvent::Error { .. } => "error",
            ThreadEvent::Unknown => "unknown",
        }
    }

    /// Whether Codex will send nothing further for this turn
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ThreadEvent::TurnCompleted { .. } | ThreadEvent::TurnFailed { .. }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadError {
    pub message: String,
}

/// Lifecycle phase of an item event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Started,
    Updated,
    Completed,
}

/// Work item reported by Codex; carries the full current state each time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadItem {
    AgentMessage {
        id: String,
        #[serde(default)]
        text: String,
    },
    Reasoning {
        id: String,
        #[serde(default)]
        text: String,
    },
    CommandExecution {
        id: String,
        command: String,
        #[serde(default)]
        aggregated_output: Option<String>,
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        status: CommandExecutionStatus,
    },
    FileChange {
        id: String,
        #[serde(default)]
        changes: Vec<FileUpdateChange>,
        #[serde(default)]
        status: PatchApplyStatus,
    },
    McpToolCall {
        id: String,
        server: String,
        tool: String,
        #[serde(default)]
        status: McpToolCallStatus,
    },
    WebSearch {
        id: String,
        query: String,
    },
    TodoList {
        id: String,
        #[serde(default)]
        items: Vec<TodoItem>,
    },
    Error {
        id: String,
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl ThreadItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            ThreadItem::AgentMessage { id, .. }
            | ThreadItem::Reasoning { id, .. }
            | ThreadItem::CommandExecution { id, .. }
            | ThreadItem::FileChange { id, .. }
            | ThreadItem::McpToolCall { id, .. }
            | ThreadItem::WebSearch { id, .. }
            | ThreadItem::TodoList { id, .. }
            | ThreadItem::Error { id, .. } => Some(id),
            ThreadItem::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandExecutionStatus {
    InProgress,
    Completed,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchApplyStatus {
    InProgress,
    Completed,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpToolCallStatus {
    InProgress,
    Completed,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdateChange {
    pub path: String,
    /// `add`, `delete` or `update`
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Settings fixed for the lifetime of a thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadOptions {
    pub working_directory: Option<PathBuf>,
    pub model: Option<String>,
    pub sandbox_mode: Option<SandboxMode>,
    pub skip_git_repo_check: bool,
}

/// Creates conversation threads
pub trait Backend: Send + Sync {
    fn start_thread(&self, options: ThreadOptions) -> Arc<dyn Thread>;
}

/// A conversation; each `run_streamed` call is one turn
#[async_trait]
pub trait Thread: Send + Sync {
    /// Codex thread id, known once the first turn has started
    fn id(&self) -> Option<String>;

    async fn run_streamed(&self, input: &str) -> Result<Box<dyn EventStream>, BackendError>;
}

/// Lazily produced events of a single turn
#[async_trait]
pub trait EventStream: Send {
    /// Next event, or `None` once the turn's output is exhausted
    async fn next_event(&mut self) -> Option<Result<ThreadEvent, BackendError>>;

    /// Release the underlying resources; later calls to `next_event` yield `None`
    async fn close(&mut self) -> Result<(), BackendError>;
}
