//! Error taxonomy for the session core.

use thiserror::Error;

/// Main error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connector-level failure: socket connect, request I/O, spawn.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The backend answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Malformed or unexpected response shape.
    #[error("decode failure: {message}")]
    Decode { message: String },

    /// Operation unsupported in remote read-only mode.
    #[error("not available in remote read-only mode: {operation}")]
    ReadOnly { operation: String },

    /// Local process lifecycle failure.
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// A device-flow poll reached a terminal non-success outcome.
    #[error("authorization ended: {outcome}")]
    AuthTerminal { outcome: String },
}

/// Errors from local backend process control.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("backend binary not found (searched: {searched})")]
    BinaryNotFound { searched: String },

    #[error("backend process is not running")]
    NotRunning,

    #[error("failed to stop backend process: {message}")]
    StopFailed { message: String },

    #[error("failed to signal backend process: {message}")]
    SignalFailed { message: String },

    #[error("failed to launch backend process: {message}")]
    SpawnFailed { message: String },
}

impl SessionError {
    /// Create a transport (connector-level) error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Create a server (HTTP-level) error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }

    /// Create a read-only-mode denial for a named operation.
    pub fn read_only(operation: impl Into<String>) -> Self {
        Self::ReadOnly {
            operation: operation.into(),
        }
    }

    /// Create a terminal authorization error.
    pub fn auth_terminal(outcome: impl Into<String>) -> Self {
        Self::AuthTerminal {
            outcome: outcome.into(),
        }
    }

    /// Whether this error is connector-level (as opposed to a structured
    /// response from the backend). The device-flow poll loop treats these
    /// as transient.
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport { .. })
    }
}
