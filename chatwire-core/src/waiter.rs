//! Races a session's terminal event against the call deadline.
//!
//! The deadline is the earlier of the caller's cancellation and a fixed
//! ceiling measured from the start of the call. Neither is an error: both end
//! the wait and leave whatever text has accumulated for the reducer.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregator::EventAggregator;
use crate::backend::{BackendSession, EventStream};
use crate::reply::Termination;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    Ceiling,
    Cancelled,
}

impl From<Expiry> for Termination {
    fn from(expiry: Expiry) -> Self {
        match expiry {
            Expiry::Ceiling => Termination::SoftTimeout,
            Expiry::Cancelled => Termination::Cancelled,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Deadline {
    caller: CancellationToken,
    at: Instant,
}

impl Deadline {
    pub fn new(caller: CancellationToken, ceiling: Duration) -> Self {
        Self {
            caller,
            at: Instant::now() + ceiling,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    /// Resolves when either source fires.
    pub async fn expired(&self) -> Expiry {
        tokio::select! {
            biased;
            _ = self.caller.cancelled() => Expiry::Cancelled,
            _ = sleep_until(self.at) => Expiry::Ceiling,
        }
    }
}

/// Send `prompt` and drive `aggregator` until a terminal event or the deadline.
pub async fn wait_for_completion(
    session: &dyn BackendSession,
    events: &mut EventStream,
    aggregator: &mut EventAggregator,
    prompt: &str,
    deadline: &Deadline,
    request_id: &str,
) -> Termination {
    let session_id = session.id().to_string();

    // Events may arrive before the send is acknowledged. Once the terminal
    // event is in, a later deadline or disconnect does not change the outcome.
    let send = session.send(prompt);
    tokio::pin!(send);
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => aggregator.apply(event),
                None if aggregator.is_done() => return settled(aggregator),
                None => return disconnected(request_id, &session_id),
            },
            ack = &mut send => match ack {
                Ok(message_id) => {
                    debug!("[{}] - [{}] Prompt accepted as {}", request_id, session_id, message_id);
                    break;
                }
                Err(e) => {
                    warn!("[{}] - [{}] Send failed: {}", request_id, session_id, e);
                    return Termination::SendFailed(e.to_string());
                }
            },
            expiry = deadline.expired() => {
                if aggregator.is_done() {
                    debug!(
                        "[{}] - [{}] Deadline passed after the terminal event",
                        request_id, session_id
                    );
                    return settled(aggregator);
                }
                return expired(expiry, request_id, &session_id);
            }
        }
    }

    while !aggregator.is_done() {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => aggregator.apply(event),
                None => return disconnected(request_id, &session_id),
            },
            expiry = deadline.expired() => return expired(expiry, request_id, &session_id),
        }
    }

    settled(aggregator)
}

/// Outcome recorded by the terminal event.
fn settled(aggregator: &EventAggregator) -> Termination {
    match aggregator.terminal().get() {
        Some(false) => Termination::SessionError,
        _ => Termination::Idle,
    }
}

fn expired(expiry: Expiry, request_id: &str, session_id: &str) -> Termination {
    match expiry {
        Expiry::Ceiling => warn!(
            "[{}] - [{}] Response ceiling reached, returning partial response",
            request_id, session_id
        ),
        Expiry::Cancelled => warn!(
            "[{}] - [{}] Caller cancelled, returning partial response",
            request_id, session_id
        ),
    }
    expiry.into()
}

fn disconnected(request_id: &str, session_id: &str) -> Termination {
    warn!(
        "[{}] - [{}] Event stream closed before completion",
        request_id, session_id
    );
    Termination::Disconnected
}
