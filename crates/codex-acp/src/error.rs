//! Error types for the codex-acp agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AcpError>;

/// Request-level errors returned to the ACP client
#[derive(Debug, Error)]
pub enum AcpError {
    /// Parameters were missing or referenced an unknown session
    #[error("{0}")]
    InvalidParams(String),

    /// The request is not allowed in the current session state
    #[error("{0}")]
    InvalidRequest(String),

    /// The method is not implemented by this agent
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The backend could not start a thread or turn
    #[error("Codex backend error: {0}")]
    Backend(#[from] BackendError),

    /// The ACP connection failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] agent_client_protocol::Error),

    /// IO errors on the transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General errors
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// JSON-RPC error for the client; the message travels in `data`
impl From<AcpError> for agent_client_protocol::Error {
    fn from(err: AcpError) -> Self {
        use agent_client_protocol::Error as RpcError;

        let base = match err {
            AcpError::Protocol(inner) => return inner,
            AcpError::InvalidParams(_) | AcpError::Serialization(_) => RpcError::invalid_params(),
            AcpError::InvalidRequest(_) => RpcError::invalid_request(),
            AcpError::MethodNotFound(_) => RpcError::method_not_found(),
            AcpError::Backend(_) | AcpError::Io(_) | AcpError::Internal(_) => {
                RpcError::internal_error()
            }
        };
        base.data(err.to_string())
    }
}

/// Slash command expansion failures
///
/// These never reach the client as errors; the turn controller reports the
/// message to the user and ends the turn with a refusal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    /// Named placeholders without a bound value
    #[error("Missing required args for {command}: {}. Provide as key=value (quote values with spaces).", .names.join(", "))]
    MissingArgs {
        /// Display form, e.g. `/deploy`
        command: String,
        /// Missing placeholder names in template order
        names: Vec<String>,
    },

    /// A token without `=` in named mode
    #[error("Could not parse {command}: expected key=value but found '{token}'. Wrap values in double quotes if they contain spaces.")]
    ExpectedKeyValue {
        /// Display form, e.g. `/deploy`
        command: String,
        /// Offending token
        token: String,
    },

    /// A token such as `=value` with nothing before the separator
    #[error("Could not parse {command}: expected a name before '=' in '{token}'.")]
    MissingKey {
        /// Display form, e.g. `/deploy`
        command: String,
        /// Offending token
        token: String,
    },
}

/// Errors from the Codex backend process
#[derive(Debug, Error)]
pub enum BackendError {
    /// The executable could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the child failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A line on stdout was not a valid event
    #[error("failed to decode event: {0}")]
    Decode(#[from] serde_json::Error),

    /// The child exited unsuccessfully
    #[error("codex exited with {status}{}", stderr_suffix(.stderr))]
    Exited {
        /// Exit status description
        status: String,
        /// Captured standard error, possibly empty
        stderr: String,
    },

    /// The stream was used after it was closed
    #[error("event stream closed")]
    Closed,
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
