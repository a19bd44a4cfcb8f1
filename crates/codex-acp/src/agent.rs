//! ACP agent: sessions and the per-prompt turn controller
//!
//! Each session owns one Codex thread. A prompt runs one turn: slash command
//! expansion, rendering, then a loop that pulls Codex events and forwards
//! the resulting updates until the turn ends, fails or is cancelled.
//!
//! At most one turn is in flight per session. `cancel` flags the turn and
//! fires its cancellation token; the loop notices at its next iteration, or
//! immediately if it is waiting for an event, and closes the event stream.

use agent_client_protocol::{
    AgentCapabilities, AvailableCommandsUpdate, ContentBlock, ContentChunk, InitializeRequest,
    InitializeResponse, NewSessionRequest, NewSessionResponse, PromptRequest, PromptResponse,
    ProtocolVersion, SessionId, SessionNotification, SessionUpdate, StopReason,
};
use codex_acp_config::{AdapterConfig, SandboxMode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backend::{Backend, ItemPhase, Thread, ThreadEvent, ThreadItem, ThreadOptions};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{ItemDispatcher, SessionBuffers};
use crate::error::{AcpError, BackendError, Result};
use crate::notifier::SessionNotifier;
use crate::render::{render_prompt, text_block};
use crate::slash::{CommandContext, RegistryOptions, SlashCommandRegistry};

/// Agent behavior derived from the adapter configuration
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub model: Option<String>,
    pub sandbox_mode: Option<SandboxMode>,
    pub skip_git_repo_check: bool,
    pub allow_commands: bool,
    pub send_reasoning: bool,
    pub prompts_dir: Option<PathBuf>,
}

impl From<&AdapterConfig> for AgentOptions {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            model: config.model.clone(),
            sandbox_mode: config.sandbox_mode,
            skip_git_repo_check: config.skip_git_repo_check,
            allow_commands: config.allow_commands,
            send_reasoning: config.send_reasoning,
            prompts_dir: config.prompts_dir.clone(),
        }
    }
}

/// Cancellation state of an in-flight turn
#[derive(Debug, Default)]
struct ActiveTurn {
    token: CancellationToken,
    cancel_requested: AtomicBool,
    finished: AtomicBool,
}

impl ActiveTurn {
    fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.token.cancel();
        self.finished.store(true, Ordering::SeqCst);
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// One ACP session bound to a Codex thread
pub struct Session {
    pub id: String,
    pub working_directory: String,
    pub model: Option<String>,
    thread: Arc<dyn Thread>,
    active_turn: Mutex<Option<Arc<ActiveTurn>>>,
    buffers: Mutex<SessionBuffers>,
}

impl Session {
    /// Whether an unfinished turn is registered
    pub fn has_active_turn(&self) -> bool {
        self.active_turn
            .lock()
            .as_ref()
            .is_some_and(|turn| !turn.is_finished())
    }
}

/// Clears the session's turn slot when the turn loop exits, unless a newer
/// turn has taken it over in the meantime
struct TurnGuard<'a> {
    session: &'a Session,
    turn: Arc<ActiveTurn>,
    idle: &'a Notify,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.turn.finished.store(true, Ordering::SeqCst);
        {
            let mut slot = self.session.active_turn.lock();
            if slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &self.turn))
            {
                *slot = None;
            }
        }
        self.idle.notify_waiters();
    }
}

#[derive(Debug, Default)]
struct EventOutcome {
    stop_reason: Option<StopReason>,
    terminate: bool,
}

impl EventOutcome {
    fn proceed() -> Self {
        Self::default()
    }

    fn stop(reason: StopReason) -> Self {
        Self {
            stop_reason: Some(reason),
            terminate: true,
        }
    }
}

/// The ACP agent
pub struct CodexAgent {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn SessionNotifier>,
    options: AgentOptions,
    dispatcher: ItemDispatcher,
    registry: SlashCommandRegistry,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    idle: Notify,
}

impl CodexAgent {
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn SessionNotifier>,
        options: AgentOptions,
    ) -> Self {
        Self::with_clock(backend, notifier, options, Arc::new(SystemClock))
    }

    /// Like [`CodexAgent::new`] with an explicit clock for the command registry
    pub fn with_clock(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn SessionNotifier>,
        options: AgentOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = SlashCommandRegistry::new(
            RegistryOptions {
                prompts_dir: options.prompts_dir.clone(),
                allow_commands: options.allow_commands,
            },
            clock,
        );

        Self {
            backend,
            notifier,
            dispatcher: ItemDispatcher::new(options.send_reasoning, options.allow_commands),
            options,
            registry,
            sessions: RwLock::new(HashMap::new()),
            idle: Notify::new(),
        }
    }

    pub fn registry(&self) -> &SlashCommandRegistry {
        &self.registry
    }

    pub fn session(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| AcpError::InvalidParams(format!("Unknown session {session_id}")))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn initialize(&self, request: InitializeRequest) -> InitializeResponse {
        info!(client_protocol = ?request.protocol_version, "initialize");

        let mut capabilities = AgentCapabilities::default();
        capabilities.prompt_capabilities.embedded_context = true;

        let mut response =
            InitializeResponse::new(request.protocol_version.min(ProtocolVersion::V1));
        response.agent_capabilities = capabilities;
        response
    }

    /// Authentication happens out of band (`codex login` or `CODEX_API_KEY`)
    pub fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    pub async fn new_session(&self, request: NewSessionRequest) -> Result<NewSessionResponse> {
        if request.cwd.as_os_str().is_empty() {
            return Err(AcpError::InvalidParams("cwd is required".to_string()));
        }
        let cwd = request.cwd.display().to_string();

        if !request.mcp_servers.is_empty() {
            warn!(
                count = request.mcp_servers.len(),
                "ignoring MCP server configuration"
            );
        }

        let thread = self.backend.start_thread(ThreadOptions {
            working_directory: Some(request.cwd.clone()),
            model: self.options.model.clone(),
            sandbox_mode: self.options.sandbox_mode,
            skip_git_repo_check: self.options.skip_git_repo_check,
        });

        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(Session {
            id: session_id.clone(),
            working_directory: cwd.clone(),
            model: self.options.model.clone(),
            thread,
            active_turn: Mutex::new(None),
            buffers: Mutex::new(SessionBuffers::default()),
        });
        self.sessions.write().insert(session_id.clone(), session);
        info!(session_id = %session_id, cwd = %cwd, "session created");

        self.registry.refresh().await;

        Ok(NewSessionResponse::new(SessionId::from(session_id)))
    }

    /// Send the slash command list to the client, if there is one
    ///
    /// Called once the `session/new` response is on its way.
    pub async fn advertise_available_commands(&self, session_id: &str) {
        self.registry.refresh_if_needed().await;

        let available_commands = self.registry.available_commands();
        if available_commands.is_empty() {
            return;
        }

        let names: Vec<String> = available_commands.iter().map(|c| c.name.clone()).collect();
        let notification = SessionNotification::new(
            SessionId::from(session_id.to_string()),
            SessionUpdate::AvailableCommandsUpdate(AvailableCommandsUpdate::new(available_commands)),
        );
        match self.notifier.session_update(notification).await {
            Ok(()) => debug!(session_id = %session_id, commands = ?names, "advertised slash commands"),
            Err(e) => warn!(session_id = %session_id, error = %e, "failed to advertise slash commands"),
        }
    }

    pub async fn prompt(&self, request: PromptRequest) -> Result<PromptResponse> {
        let session = self.session(&request.session_id.to_string())?;
        let guard = Self::begin_turn(&session, &self.idle)?;

        let span = info_span!("acp_turn", session_id = %session.id);
        let stop_reason = self
            .run_turn(&session, &guard.turn, request.prompt)
            .instrument(span)
            .await?;

        debug!(session_id = %session.id, stop_reason = ?stop_reason, "prompt finished");
        Ok(PromptResponse::new(stop_reason))
    }

    /// Cancel the session's in-flight turn; a no-op when there is none
    pub fn cancel(&self, session_id: &str) -> Result<()> {
        let session = self.session(session_id)?;
        let turn = session.active_turn.lock().clone();

        match turn {
            Some(turn) if !turn.is_finished() => {
                info!(session_id = %session_id, "cancelling turn");
                turn.request_cancel();
            }
            _ => debug!(session_id = %session_id, "cancel ignored: no active turn"),
        }
        Ok(())
    }

    /// Cancel every in-flight turn, used when the client goes away
    pub fn cancel_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            if let Some(turn) = session.active_turn.lock().clone() {
                if !turn.is_finished() {
                    debug!(session_id = %session.id, "cancelling turn on shutdown");
                    turn.request_cancel();
                }
            }
        }
    }

    /// Wait until no session has a turn loop running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.has_running_turns() {
                return;
            }
            notified.await;
        }
    }

    /// Whether any turn loop has not exited yet, cancelled ones included
    fn has_running_turns(&self) -> bool {
        self.sessions
            .read()
            .values()
            .any(|session| session.active_turn.lock().is_some())
    }

    fn begin_turn<'a>(session: &'a Session, idle: &'a Notify) -> Result<TurnGuard<'a>> {
        let mut slot = session.active_turn.lock();
        if slot.as_ref().is_some_and(|turn| !turn.is_finished()) {
            return Err(AcpError::InvalidRequest(
                "session already has an active prompt".to_string(),
            ));
        }

        let turn = Arc::new(ActiveTurn::default());
        *slot = Some(Arc::clone(&turn));
        Ok(TurnGuard {
            session,
            turn,
            idle,
        })
    }

    async fn run_turn(
        &self,
        session: &Session,
        turn: &ActiveTurn,
        blocks: Vec<ContentBlock>,
    ) -> Result<StopReason> {
        self.registry.refresh_if_needed().await;

        let mut blocks = blocks;
        if let Some(slash) = self.registry.match_blocks(&blocks) {
            let context = CommandContext {
                working_directory: session.working_directory.clone(),
                model: session.model.clone(),
            };
            match self.registry.apply(&blocks, &slash, &context) {
                Ok(expanded) => {
                    debug!(command = %slash.definition.name, "slash command detected");
                    blocks = expanded;
                }
                Err(e) => {
                    warn!(command = %slash.definition.name, error = %e, "slash command expansion failed");
                    self.emit_agent_message(session, &e.to_string()).await;
                    return Ok(StopReason::Refusal);
                }
            }
        }

        let prompt_text = render_prompt(&blocks);
        debug!(length = prompt_text.len(), "prompt start");

        let mut stream = session.thread.run_streamed(&prompt_text).await?;
        let mut stop_reason = StopReason::EndTurn;
        let mut exhausted = false;

        let result: std::result::Result<(), BackendError> = loop {
            if turn.cancel_requested() {
                debug!("prompt cancelled");
                stop_reason = StopReason::Cancelled;
                break Ok(());
            }

            let next = tokio::select! {
                biased;
                _ = turn.token.cancelled() => continue,
                next = stream.next_event() => next,
            };

            match next {
                None => {
                    exhausted = true;
                    break Ok(());
                }
                Some(Err(e)) => break Err(e),
                Some(Ok(event)) => {
                    let outcome = self.handle_event(session, turn, event).await;
                    if let Some(reason) = outcome.stop_reason {
                        stop_reason = reason;
                    }
                    if outcome.terminate {
                        break Ok(());
                    }
                }
            }
        };

        if let Err(e) = result {
            error!(error = %e, "prompt loop error");
            self.emit_agent_message(session, &format!("Codex error: {e}"))
                .await;
            stop_reason = if turn.cancel_requested() {
                StopReason::Cancelled
            } else {
                StopReason::Refusal
            };
        }

        if !exhausted {
            if let Err(e) = stream.close().await {
                warn!(error = %e, "failed to close event stream");
            }
        }

        Ok(stop_reason)
    }

    async fn handle_event(
        &self,
        session: &Session,
        turn: &ActiveTurn,
        event: ThreadEvent,
    ) -> EventOutcome {
        debug!(kind = event.kind(), "codex event");
        match event {
            ThreadEvent::ThreadStarted { thread_id } => {
                debug!(thread_id = %thread_id, "thread started");
                EventOutcome::proceed()
            }
            ThreadEvent::TurnStarted => {
                debug!("turn started");
                EventOutcome::proceed()
            }
            ThreadEvent::ItemStarted { item } => {
                self.handle_item(session, &item, ItemPhase::Started).await;
                EventOutcome::proceed()
            }
            ThreadEvent::ItemUpdated { item } => {
                self.handle_item(session, &item, ItemPhase::Updated).await;
                EventOutcome::proceed()
            }
            ThreadEvent::ItemCompleted { item } => {
                self.handle_item(session, &item, ItemPhase::Completed).await;
                EventOutcome::proceed()
            }
            ThreadEvent::TurnCompleted { usage } => {
                debug!(usage = ?usage, "turn completed");
                EventOutcome::stop(StopReason::EndTurn)
            }
            ThreadEvent::TurnFailed { error } => {
                warn!(error = %error.message, "turn failed");
                self.emit_agent_message(session, &format!("Codex run failed: {}", error.message))
                    .await;
                EventOutcome::stop(if turn.cancel_requested() {
                    StopReason::Cancelled
                } else {
                    StopReason::Refusal
                })
            }
            ThreadEvent::Error { message } => {
                error!(message = %message, "stream error");
                self.emit_agent_message(session, &format!("Codex stream error: {message}"))
                    .await;
                EventOutcome::stop(StopReason::Refusal)
            }
            ThreadEvent::Unknown => {
                debug!("unhandled event");
                EventOutcome::proceed()
            }
        }
    }

    async fn handle_item(&self, session: &Session, item: &ThreadItem, phase: ItemPhase) {
        let updates = self
            .dispatcher
            .dispatch(&mut session.buffers.lock(), item, phase);
        for update in updates {
            self.send_update(session, update).await;
        }
    }

    async fn emit_agent_message(&self, session: &Session, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.send_update(
            session,
            SessionUpdate::AgentMessageChunk(ContentChunk::new(text_block(text))),
        )
        .await;
    }

    async fn send_update(&self, session: &Session, update: SessionUpdate) {
        let notification = SessionNotification::new(SessionId::from(session.id.clone()), update);
        if let Err(e) = self.notifier.session_update(notification).await {
            warn!(session_id = %session.id, error = %e, "failed to send session update");
        }
    }
}
