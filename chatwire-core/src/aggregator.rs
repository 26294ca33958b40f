//! Reduces a session's event stream to accumulated text or a terminal error.

use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::backend::SessionEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregatorState {
    Waiting,
    Collecting,
    Done,
}

/// Single-fire completion flag. The first `fire` wins; later calls are no-ops.
#[derive(Debug, Default)]
pub struct TerminalSignal {
    succeeded: OnceLock<bool>,
}

impl TerminalSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this call resolved the signal.
    pub fn fire(&self, succeeded: bool) -> bool {
        self.succeeded.set(succeeded).is_ok()
    }

    pub fn get(&self) -> Option<bool> {
        self.succeeded.get().copied()
    }

    pub fn is_set(&self) -> bool {
        self.succeeded.get().is_some()
    }
}

/// Consumes events for one session, in arrival order, from a single consumer.
#[derive(Debug)]
pub struct EventAggregator {
    state: AggregatorState,
    buffer: String,
    last_error: Option<String>,
    terminal: TerminalSignal,
    session_id: String,
}

impl EventAggregator {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            state: AggregatorState::Waiting,
            buffer: String::new(),
            last_error: None,
            terminal: TerminalSignal::new(),
            session_id: session_id.into(),
        }
    }

    pub fn apply(&mut self, event: SessionEvent) {
        if self.state == AggregatorState::Done {
            trace!("[] - [{}] Ignoring event after completion: {:?}", self.session_id, event);
            return;
        }

        match event {
            SessionEvent::Delta(text) => {
                self.buffer.push_str(&text);
                self.state = AggregatorState::Collecting;
            }
            SessionEvent::Message(full_text) => {
                debug!(
                    "[] - [{}] Assistant message received ({} chars, {} buffered)",
                    self.session_id,
                    full_text.len(),
                    self.buffer.len()
                );
            }
            SessionEvent::Error(message) => {
                if self.terminal.fire(false) {
                    debug!("[] - [{}] Session error: {}", self.session_id, message);
                    self.last_error = Some(message);
                    self.state = AggregatorState::Done;
                }
            }
            SessionEvent::Idle => {
                if self.terminal.fire(true) {
                    debug!("[] - [{}] Session idle", self.session_id);
                    self.state = AggregatorState::Done;
                }
            }
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == AggregatorState::Done
    }

    pub fn terminal(&self) -> &TerminalSignal {
        &self.terminal
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn into_parts(self) -> (String, Option<String>) {
        (self.buffer, self.last_error)
    }
}
