//! ACP connection over a byte stream (stdio in production)
//!
//! Framing, request decoding and routing belong to `agent-client-protocol`'s
//! [`AgentSideConnection`](acp::AgentSideConnection). It runs every request as
//! a local task, so a long `session/prompt` never blocks `session/cancel`.
//! Session updates can be produced from any task; they queue on an
//! [`Outbox`] and a single forwarding task hands them to the connection in
//! order.

use agent_client_protocol::{self as acp, Client as _};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::agent::CodexAgent;
use crate::error::{AcpError, Result};
use crate::notifier::SessionNotifier;

/// How long cancelled turns get to close their Codex processes once the
/// client has gone away
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type QueuedUpdate = (acp::SessionNotification, oneshot::Sender<()>);

/// Sending half of the session update queue
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<QueuedUpdate>,
}

/// Receiving half of the session update queue, drained by [`serve`]
#[derive(Debug)]
pub struct UpdateQueue {
    rx: mpsc::UnboundedReceiver<QueuedUpdate>,
}

impl Outbox {
    pub fn channel() -> (Outbox, UpdateQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox { tx }, UpdateQueue { rx })
    }
}

#[async_trait]
impl SessionNotifier for Outbox {
    /// Resolves once the connection has accepted the update
    async fn session_update(&self, notification: acp::SessionNotification) -> Result<()> {
        let (delivered, accepted) = oneshot::channel();
        self.tx
            .send((notification, delivered))
            .map_err(|_| AcpError::Internal(anyhow::anyhow!("connection closed")))?;
        accepted
            .await
            .map_err(|_| AcpError::Internal(anyhow::anyhow!("session update was not delivered")))
    }
}

/// Routes decoded ACP requests to the agent
struct AgentHandler {
    agent: Arc<CodexAgent>,
}

fn rejected(method: &'static str) -> impl Fn(AcpError) -> acp::Error {
    move |e| {
        warn!(method, error = %e, "request failed");
        e.into()
    }
}

#[async_trait(?Send)]
impl acp::Agent for AgentHandler {
    async fn initialize(&self, args: acp::InitializeRequest) -> acp::Result<acp::InitializeResponse> {
        Ok(self.agent.initialize(args))
    }

    async fn authenticate(
        &self,
        _args: acp::AuthenticateRequest,
    ) -> acp::Result<acp::AuthenticateResponse> {
        self.agent.authenticate().map_err(rejected("authenticate"))?;
        Ok(acp::AuthenticateResponse::new())
    }

    async fn new_session(
        &self,
        args: acp::NewSessionRequest,
    ) -> acp::Result<acp::NewSessionResponse> {
        let response = self
            .agent
            .new_session(args)
            .await
            .map_err(rejected("session/new"))?;

        // Runs after this handler returns, so the response goes out first
        let agent = Arc::clone(&self.agent);
        let session_id = response.session_id.to_string();
        tokio::task::spawn_local(async move {
            agent.advertise_available_commands(&session_id).await;
        });

        Ok(response)
    }

    async fn prompt(&self, args: acp::PromptRequest) -> acp::Result<acp::PromptResponse> {
        self.agent
            .prompt(args)
            .await
            .map_err(rejected("session/prompt"))
    }

    async fn cancel(&self, args: acp::CancelNotification) -> acp::Result<()> {
        self.agent
            .cancel(&args.session_id.to_string())
            .map_err(rejected("session/cancel"))
    }
}

/// Hand queued updates to the connection, one at a time
async fn forward_updates(connection: acp::AgentSideConnection, mut updates: UpdateQueue) {
    while let Some((notification, delivered)) = updates.rx.recv().await {
        if let Err(e) = connection.session_notification(notification).await {
            warn!(error = %e, "failed to send session update");
            break;
        }
        let _ = delivered.send(());
    }
    debug!("session update queue closed");
}

/// Serve one ACP client until its input closes
///
/// When the input closes, running turns are cancelled and get
/// [`SHUTDOWN_GRACE`] to wind down before this returns.
pub async fn serve<R, W>(agent: Arc<CodexAgent>, updates: UpdateQueue, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin + 'static,
    W: AsyncWrite + Unpin + 'static,
{
    let local = LocalSet::new();
    local
        .run_until(async move {
            let handler = AgentHandler {
                agent: Arc::clone(&agent),
            };
            let (connection, io_task) = acp::AgentSideConnection::new(
                handler,
                output.compat_write(),
                input.compat(),
                |fut| {
                    tokio::task::spawn_local(fut);
                },
            );
            let forwarder = tokio::task::spawn_local(forward_updates(connection, updates));

            let result = io_task.await;
            debug!("input closed");

            agent.cancel_all();
            if tokio::time::timeout(SHUTDOWN_GRACE, agent.wait_idle())
                .await
                .is_err()
            {
                warn!("turns still running at shutdown");
            }
            forwarder.abort();

            result.map_err(AcpError::from)
        })
        .await
}
