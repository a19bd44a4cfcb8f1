//! Outbound channel for `session/update` notifications

use agent_client_protocol::SessionNotification;
use async_trait::async_trait;

use crate::error::Result;

/// Delivers session updates to the connected client
#[async_trait]
pub trait SessionNotifier: Send + Sync {
    async fn session_update(&self, notification: SessionNotification) -> Result<()>;
}
