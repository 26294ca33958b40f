use thiserror::Error;

/// Failures reported by a completion backend.
///
/// `Clone` so that a single failed start attempt can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("backend returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("backend has not been started")]
    NotStarted,
    #[error("session {0} is closed")]
    SessionClosed(String),
}

/// Errors that escape `ask`.
///
/// Everything else (backend error events, timeouts, cancellation, send
/// failures) is folded into the reply text instead.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("failed to start the completion backend: {0}")]
    Start(#[source] BackendError),
    #[error("failed to open a session: {0}")]
    OpenSession(#[source] BackendError),
}

impl ChatError {
    pub fn is_start_failure(&self) -> bool {
        matches!(self, ChatError::Start(_))
    }
}
