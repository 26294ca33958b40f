use tracing::{debug, warn};

use crate::backend::{BackendSession, EventStream};

/// A backend session scoped to one call.
///
/// Call [`ScopedSession::close`] on the normal path. If the guard is dropped
/// without it (early return, panic, or the caller dropping the future), the
/// session is closed on a background task instead.
pub struct ScopedSession {
    session: Option<Box<dyn BackendSession>>,
    request_id: String,
    session_id: String,
}

impl ScopedSession {
    pub fn new(session: Box<dyn BackendSession>, request_id: String) -> Self {
        let session_id = session.id().to_string();
        Self {
            session: Some(session),
            request_id,
            session_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn session(&self) -> Option<&dyn BackendSession> {
        self.session.as_deref()
    }

    pub fn take_events(&mut self) -> Option<EventStream> {
        self.session.as_mut().and_then(|s| s.take_events())
    }

    /// Release the session now. Failures are logged, never returned.
    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            debug!("[{}] - [{}] Closing session", self.request_id, self.session_id);
            if let Err(e) = session.close().await {
                warn!(
                    "[{}] - [{}] Failed to close session: {}",
                    self.request_id, self.session_id, e
                );
            }
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        debug!(
            "[{}] - [{}] Session dropped before close, releasing in background",
            self.request_id, self.session_id
        );
        let session_id = self.session_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!("[] - [{}] Failed to close session: {}", session_id, e);
                    }
                });
            }
            Err(_) => {
                warn!("[] - [{}] No runtime available, session leaked", session_id);
            }
        }
    }
}
