//! Translation of Codex items into ACP session updates

use agent_client_protocol::{
    ContentChunk, Plan, PlanEntry, PlanEntryPriority, PlanEntryStatus, SessionUpdate, ToolCall,
    ToolCallContent, ToolCallId, ToolCallStatus, ToolCallUpdate, ToolCallUpdateFields, ToolKind,
};
use serde_json::json;
use tracing::debug;

use crate::backend::{
    CommandExecutionStatus, ItemPhase, McpToolCallStatus, PatchApplyStatus, ThreadItem,
};
use crate::delta::DeltaBuffer;
use crate::render::text_block;

/// Per-session incremental text state, one buffer per item kind
#[derive(Debug, Default)]
pub struct SessionBuffers {
    pub agent_message: DeltaBuffer,
    pub reasoning: DeltaBuffer,
    pub command_output: DeltaBuffer,
}

/// Maps item events to the updates a client should see
#[derive(Debug, Clone, Copy)]
pub struct ItemDispatcher {
    pub send_reasoning: bool,
    pub allow_commands: bool,
}

impl ItemDispatcher {
    pub fn new(send_reasoning: bool, allow_commands: bool) -> Self {
        Self {
            send_reasoning,
            allow_commands,
        }
    }

    /// Updates produced by one item event, in emission order
    ///
    /// Buffer entries for the item are dropped once its `completed` event
    /// has been handled.
    pub fn dispatch(
        &self,
        buffers: &mut SessionBuffers,
        item: &ThreadItem,
        phase: ItemPhase,
    ) -> Vec<SessionUpdate> {
        let updates = match item {
            ThreadItem::AgentMessage { id, text } => {
                text_delta(&mut buffers.agent_message, id, text, phase)
                    .map(|delta| SessionUpdate::AgentMessageChunk(text_chunk(delta)))
                    .into_iter()
                    .collect()
            }
            ThreadItem::Reasoning { id, text } => {
                if !self.send_reasoning {
                    return Vec::new();
                }
                text_delta(&mut buffers.reasoning, id, text, phase)
                    .map(|delta| SessionUpdate::AgentThoughtChunk(text_chunk(delta)))
                    .into_iter()
                    .collect()
            }
            ThreadItem::CommandExecution {
                id,
                command,
                aggregated_output,
                exit_code,
                status,
            } => {
                if !self.allow_commands {
                    return Vec::new();
                }
                vec![command_update(
                    &mut buffers.command_output,
                    id,
                    command,
                    aggregated_output.as_deref(),
                    *exit_code,
                    *status,
                    phase,
                )]
            }
            ThreadItem::FileChange {
                id,
                changes,
                status,
            } => {
                let listing = if changes.is_empty() {
                    "No file updates".to_string()
                } else {
                    changes
                        .iter()
                        .map(|change| format!("{} {}", change.kind.to_uppercase(), change.path))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                let content = vec![text_content(listing)];

                let update = if phase == ItemPhase::Started {
                    let status = match status {
                        PatchApplyStatus::Failed => ToolCallStatus::Failed,
                        _ => ToolCallStatus::InProgress,
                    };
                    SessionUpdate::ToolCall(new_tool_call(
                        id,
                        "Proposed file changes".to_string(),
                        ToolKind::Edit,
                        status,
                        content,
                    ))
                } else {
                    let mut fields = ToolCallUpdateFields::default();
                    fields.title = Some("File changes".to_string());
                    fields.status = Some(patch_status(*status));
                    fields.content = Some(content);
                    SessionUpdate::ToolCallUpdate(ToolCallUpdate::new(
                        ToolCallId::new(id.as_str()),
                        fields,
                    ))
                };
                vec![update]
            }
            ThreadItem::McpToolCall {
                id,
                server,
                tool,
                status,
            } => vec![tool_call(
                id,
                format!("{server}.{tool}"),
                ToolKind::Fetch,
                mcp_status(*status),
                phase,
            )],
            ThreadItem::WebSearch { id, query } => {
                let status = if phase == ItemPhase::Completed {
                    ToolCallStatus::Completed
                } else {
                    ToolCallStatus::InProgress
                };
                vec![tool_call(
                    id,
                    format!("Search: {query}"),
                    ToolKind::Search,
                    status,
                    phase,
                )]
            }
            ThreadItem::TodoList { items, .. } => {
                let entries = items
                    .iter()
                    .map(|todo| {
                        if todo.completed {
                            PlanEntry::new(
                                todo.text.clone(),
                                PlanEntryPriority::Medium,
                                PlanEntryStatus::Completed,
                            )
                        } else {
                            PlanEntry::new(
                                todo.text.clone(),
                                PlanEntryPriority::High,
                                PlanEntryStatus::Pending,
                            )
                        }
                    })
                    .collect();
                vec![SessionUpdate::Plan(Plan::new(entries))]
            }
            ThreadItem::Error { message, .. } => vec![SessionUpdate::AgentMessageChunk(text_chunk(
                format!("Codex error item: {message}"),
            ))],
            ThreadItem::Unknown => {
                debug!("ignored unknown item");
                Vec::new()
            }
        };

        if phase == ItemPhase::Completed {
            if let Some(id) = item.id() {
                buffers.agent_message.evict(id);
                buffers.reasoning.evict(id);
                buffers.command_output.evict(id);
            }
        }

        updates
    }
}

fn text_chunk(text: impl Into<String>) -> ContentChunk {
    ContentChunk::new(text_block(text))
}

fn text_content(text: impl Into<String>) -> ToolCallContent {
    ToolCallContent::from(text_block(text))
}

fn new_tool_call(
    id: &str,
    title: String,
    kind: ToolKind,
    status: ToolCallStatus,
    content: Vec<ToolCallContent>,
) -> ToolCall {
    let mut call = ToolCall::new(ToolCallId::new(id), title);
    call.kind = kind;
    call.status = status;
    call.content = content;
    call
}

/// Non-empty delta for a streamed text item
fn text_delta(buffer: &mut DeltaBuffer, id: &str, text: &str, phase: ItemPhase) -> Option<String> {
    if phase == ItemPhase::Started && text.is_empty() {
        return None;
    }
    buffer
        .compute(id, Some(text))
        .filter(|delta| !delta.is_empty())
}

fn command_update(
    buffer: &mut DeltaBuffer,
    id: &str,
    command: &str,
    aggregated_output: Option<&str>,
    exit_code: Option<i32>,
    status: CommandExecutionStatus,
    phase: ItemPhase,
) -> SessionUpdate {
    let status = command_status(status);

    if phase == ItemPhase::Started {
        // Seed the buffer so the first update only carries new output
        buffer.compute(id, aggregated_output);
        let content = aggregated_output
            .filter(|output| !output.is_empty())
            .map(|output| vec![text_content(output)])
            .unwrap_or_default();

        return SessionUpdate::ToolCall(new_tool_call(
            id,
            format!("Run: {command}"),
            ToolKind::Execute,
            status,
            content,
        ));
    }

    let delta = buffer
        .compute(id, aggregated_output)
        .filter(|delta| !delta.is_empty());

    let mut fields = ToolCallUpdateFields::default();
    fields.status = Some(status);
    fields.content = delta.map(|delta| vec![text_content(delta)]);
    fields.raw_output = exit_code.map(|code| json!({ "exitCode": code }));
    SessionUpdate::ToolCallUpdate(ToolCallUpdate::new(ToolCallId::new(id), fields))
}

fn tool_call(
    id: &str,
    title: String,
    kind: ToolKind,
    status: ToolCallStatus,
    phase: ItemPhase,
) -> SessionUpdate {
    if phase == ItemPhase::Started {
        SessionUpdate::ToolCall(new_tool_call(id, title, kind, status, Vec::new()))
    } else {
        let mut fields = ToolCallUpdateFields::default();
        fields.title = Some(title);
        fields.kind = Some(kind);
        fields.status = Some(status);
        SessionUpdate::ToolCallUpdate(ToolCallUpdate::new(ToolCallId::new(id), fields))
    }
}

fn command_status(status: CommandExecutionStatus) -> ToolCallStatus {
    match status {
        CommandExecutionStatus::InProgress | CommandExecutionStatus::Unknown => {
            ToolCallStatus::InProgress
        }
        CommandExecutionStatus::Completed => ToolCallStatus::Completed,
        CommandExecutionStatus::Failed => ToolCallStatus::Failed,
    }
}

fn patch_status(status: PatchApplyStatus) -> ToolCallStatus {
    match status {
        PatchApplyStatus::Completed => ToolCallStatus::Completed,
        PatchApplyStatus::Failed => ToolCallStatus::Failed,
        PatchApplyStatus::InProgress | PatchApplyStatus::Unknown => ToolCallStatus::InProgress,
    }
}

fn mcp_status(status: McpToolCallStatus) -> ToolCallStatus {
    match status {
        McpToolCallStatus::Completed => ToolCallStatus::Completed,
        McpToolCallStatus::Failed => ToolCallStatus::Failed,
        McpToolCallStatus::InProgress | McpToolCallStatus::Unknown => ToolCallStatus::InProgress,
    }
}
