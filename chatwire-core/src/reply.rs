//! Final reduction of a call into the text handed back to the caller.

use std::fmt;

/// Returned when a call produced neither text nor an error.
pub const NO_RESPONSE_MESSAGE: &str =
    "I wasn't able to generate a response. Please try again.";

/// Why the completion waiter stopped waiting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The session went idle.
    Idle,
    /// The session reported an error event.
    SessionError,
    /// The response ceiling elapsed first.
    SoftTimeout,
    /// The caller's cancellation token fired first.
    Cancelled,
    /// The send itself failed.
    SendFailed(String),
    /// The event stream closed before a terminal event.
    Disconnected,
}

impl Termination {
    pub fn is_clean(&self) -> bool {
        matches!(self, Termination::Idle)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Idle => write!(f, "idle"),
            Termination::SessionError => write!(f, "session error"),
            Termination::SoftTimeout => write!(f, "timed out"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::SendFailed(e) => write!(f, "send failed: {}", e),
            Termination::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Typed reply before it is flattened to a string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Failed(String),
    Empty,
}

impl Reply {
    /// Partial or complete text always wins over an error.
    pub fn reduce(buffer: String, last_error: Option<String>) -> Self {
        if !buffer.is_empty() {
            Reply::Text(buffer)
        } else if let Some(message) = last_error {
            Reply::Failed(message)
        } else {
            Reply::Empty
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::Failed(message) => format!("Error: {}", message),
            Reply::Empty => NO_RESPONSE_MESSAGE.to_string(),
        }
    }
}

/// Everything known about a finished call.
#[derive(Clone, Debug)]
pub struct Completion {
    pub request_id: String,
    pub session_id: String,
    pub reply: Reply,
    pub termination: Termination,
}

impl Completion {
    pub fn into_text(self) -> String {
        self.reply.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_beats_error() {
        let reply = Reply::reduce("partial".into(), Some("boom".into()));
        assert_eq!(reply.into_text(), "partial");
    }

    #[test]
    fn error_without_text() {
        let reply = Reply::reduce(String::new(), Some("rate limited".into()));
        assert_eq!(reply, Reply::Failed("rate limited".into()));
        assert_eq!(reply.into_text(), "Error: rate limited");
    }

    #[test]
    fn nothing_at_all() {
        let reply = Reply::reduce(String::new(), None);
        assert_eq!(reply, Reply::Empty);
        assert_eq!(reply.into_text(), NO_RESPONSE_MESSAGE);
    }
}
