//! One-time start of the shared backend connection.
//!
//! The first caller creates the start attempt; everyone who arrives while it
//! is in flight awaits the same attempt and sees the same result. A failed
//! attempt leaves the guard in `NotStarted` so the next caller retries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::BackendError;

type StartAttempt = Shared<BoxFuture<'static, Result<(), BackendError>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartStatus {
    NotStarted,
    Starting,
    Started,
}

enum StartState {
    NotStarted,
    Starting { attempt: u64, future: StartAttempt },
    Started,
}

pub struct StartGuard {
    started: AtomicBool,
    attempts: AtomicU64,
    state: Mutex<StartState>,
}

impl Default for StartGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGuard {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            state: Mutex::new(StartState::NotStarted),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> StartStatus {
        match &*self.state.lock().await {
            StartState::NotStarted => StartStatus::NotStarted,
            StartState::Starting { .. } => StartStatus::Starting,
            StartState::Started => StartStatus::Started,
        }
    }

    /// Start the backend unless it already is. Safe to call concurrently.
    pub async fn ensure_started(&self, backend: &Arc<dyn Backend>) -> Result<(), BackendError> {
        if self.is_started() {
            return Ok(());
        }

        let (attempt, future) = {
            let mut state = self.state.lock().await;
            match &*state {
                StartState::Started => return Ok(()),
                StartState::Starting { attempt, future } => {
                    debug!("Backend start already in flight (attempt {}), waiting", attempt);
                    (*attempt, future.clone())
                }
                StartState::NotStarted => {
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    info!("Starting backend (attempt {})", attempt);
                    let backend = Arc::clone(backend);
                    let future = async move { backend.start().await }.boxed().shared();
                    *state = StartState::Starting {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let result = future.await;

        let mut state = self.state.lock().await;
        if matches!(&*state, StartState::Starting { attempt: current, .. } if *current == attempt) {
            match &result {
                Ok(()) => {
                    info!("Backend started");
                    *state = StartState::Started;
                    self.started.store(true, Ordering::Release);
                }
                Err(e) => {
                    warn!("Backend start failed (attempt {}): {}", attempt, e);
                    *state = StartState::NotStarted;
                }
            }
        }
        result
    }

    /// Stop the backend if it was started. Failures are logged and swallowed.
    pub async fn shutdown(&self, backend: &dyn Backend) {
        let mut state = self.state.lock().await;
        if matches!(&*state, StartState::Started) {
            info!("Stopping backend");
            if let Err(e) = backend.stop().await {
                warn!("Failed to stop backend: {}", e);
            }
        } else {
            debug!("Backend never started, nothing to stop");
        }
        *state = StartState::NotStarted;
        self.started.store(false, Ordering::Release);
    }
}
