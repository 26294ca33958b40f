//! Contract between the orchestration layer and a completion backend.
//!
//! A backend reports progress through a stream of [`SessionEvent`]s rather
//! than returning a value. Each [`BackendSession`] owns exactly one such
//! stream, delivered in arrival order to a single consumer.

use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::BackendError;
use crate::session::SessionConfig;

/// Events emitted by a backend session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Incremental fragment of response text.
    Delta(String),
    /// Full text of one assistant message. Informational only.
    Message(String),
    /// The backend failed to complete the current send.
    Error(String),
    /// The backend finished producing output for the current send.
    Idle,
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Error(_) | SessionEvent::Idle)
    }
}

pub type EventStream = UnboundedReceiver<SessionEvent>;
pub type EventSink = UnboundedSender<SessionEvent>;

/// Creates the channel a backend session publishes its events on.
pub fn event_channel() -> (EventSink, EventStream) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The long-lived connection to a completion service.
///
/// `start` is called at most once per successful lifetime by the lifecycle
/// guard; `create_session` must be safe to call concurrently once started.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn start(&self) -> Result<(), BackendError>;

    async fn stop(&self) -> Result<(), BackendError>;

    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn BackendSession>, BackendError>;
}

/// A conversation context scoped to one call.
#[async_trait]
pub trait BackendSession: Send + Sync {
    fn id(&self) -> &str;

    /// Hands out the event stream. Returns `None` on every call after the first.
    fn take_events(&mut self) -> Option<EventStream>;

    /// Submits a prompt and returns the backend's message id.
    ///
    /// The acknowledgment may arrive before, during, or after the events the
    /// prompt produces.
    async fn send(&self, prompt: &str) -> Result<String, BackendError>;

    async fn close(self: Box<Self>) -> Result<(), BackendError>;
}
