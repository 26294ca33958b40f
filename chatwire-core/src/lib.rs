//! Session orchestration over an event-driven chat-completion backend.
//!
//! The backend reports progress as a stream of events. [`ChatService`] turns
//! that into a bounded, cancellable request/response call:
//! - the shared backend connection is started once, on first use
//! - each call opens its own session and always releases it
//! - deltas are accumulated until the session goes idle or errors
//! - a fixed ceiling and the caller's token bound the wait
//! - the result is always a string; only start and session-open failures are errors

pub mod aggregator;
pub mod backend;
pub mod config;
pub mod error;
pub mod reply;
pub mod scripted;
pub mod service;
pub mod session;
pub mod start_guard;
pub mod streaming;
pub mod tools;
pub mod waiter;

pub use aggregator::{AggregatorState, EventAggregator, TerminalSignal};
pub use backend::{event_channel, Backend, BackendSession, EventSink, EventStream, SessionEvent};
pub use config::{ChatConfig, SessionSettings, SettingsSnapshot};
pub use error::{BackendError, ChatError};
pub use reply::{Completion, Reply, Termination, NO_RESPONSE_MESSAGE};
pub use service::ChatService;
pub use session::{SessionConfig, SystemMessage, SystemMessageMode};
pub use start_guard::{StartGuard, StartStatus};
pub use tools::{Tool, ToolSet};

pub use tokio_util::sync::CancellationToken;
