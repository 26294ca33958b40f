//! In-memory backend that replays a fixed script of events.
//!
//! Every session opened from a [`ScriptedBackend`] plays the same script once
//! its prompt is sent. Counters record how the backend was driven.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{event_channel, Backend, BackendSession, EventSink, EventStream, SessionEvent};
use crate::error::BackendError;
use crate::session::SessionConfig;

#[derive(Clone, Debug)]
pub enum ScriptStep {
    Emit(SessionEvent),
    Pause(Duration),
}

#[derive(Debug, Default)]
struct Counters {
    starts: AtomicUsize,
    stops: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    last_config: Mutex<Option<SessionConfig>>,
}

#[derive(Debug)]
pub struct ScriptedBackend {
    script: Vec<ScriptStep>,
    start_delay: Duration,
    start_failures: AtomicUsize,
    stop_error: Option<String>,
    open_error: Option<String>,
    send_error: Option<String>,
    send_delay: Duration,
    disconnect_after_script: bool,
    counters: Arc<Counters>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            start_delay: Duration::ZERO,
            start_failures: AtomicUsize::new(0),
            stop_error: None,
            open_error: None,
            send_error: None,
            send_delay: Duration::ZERO,
            disconnect_after_script: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Script that emits each delta and then goes idle.
    pub fn replying(deltas: &[&str]) -> Self {
        let mut script: Vec<ScriptStep> = deltas
            .iter()
            .map(|d| ScriptStep::Emit(SessionEvent::Delta(d.to_string())))
            .collect();
        script.push(ScriptStep::Emit(SessionEvent::Idle));
        Self::new(script)
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// The first `count` start attempts fail.
    pub fn with_start_failures(self, count: usize) -> Self {
        self.start_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_stop_error(mut self, message: impl Into<String>) -> Self {
        self.stop_error = Some(message.into());
        self
    }

    pub fn with_open_error(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    pub fn with_send_error(mut self, message: impl Into<String>) -> Self {
        self.send_error = Some(message.into());
        self
    }

    /// Delay the send acknowledgment; the script starts playing immediately.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Close the event stream once the script has played.
    pub fn with_disconnect_after_script(mut self) -> Self {
        self.disconnect_after_script = true;
        self
    }

    pub fn start_calls(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.counters
            .prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_config(&self) -> Option<SessionConfig> {
        self.counters
            .last_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn start(&self) -> Result<(), BackendError> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        let failing = self
            .start_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BackendError::Connection("scripted start failure".to_string()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BackendError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        match &self.stop_error {
            Some(message) => Err(BackendError::Connection(message.clone())),
            None => Ok(()),
        }
    }

    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn BackendSession>, BackendError> {
        if let Some(message) = &self.open_error {
            return Err(BackendError::Protocol(message.clone()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        *self
            .counters
            .last_config
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(config);

        let (sink, events) = event_channel();
        Ok(Box::new(ScriptedSession {
            id: format!("scripted-{}", Uuid::new_v4()),
            script: self.script.clone(),
            sink: Mutex::new(Some(sink)),
            events: Some(events),
            send_error: self.send_error.clone(),
            send_delay: self.send_delay,
            disconnect_after_script: self.disconnect_after_script,
            player: Mutex::new(None),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedSession {
    id: String,
    script: Vec<ScriptStep>,
    sink: Mutex<Option<EventSink>>,
    events: Option<EventStream>,
    send_error: Option<String>,
    send_delay: Duration,
    disconnect_after_script: bool,
    player: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

#[async_trait]
impl BackendSession for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    async fn send(&self, prompt: &str) -> Result<String, BackendError> {
        self.counters
            .prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        if let Some(message) = &self.send_error {
            return Err(BackendError::Connection(message.clone()));
        }

        let sink = {
            let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
            if self.disconnect_after_script {
                guard.take()
            } else {
                guard.clone()
            }
        }
        .ok_or_else(|| BackendError::SessionClosed(self.id.clone()))?;

        let script = self.script.clone();
        let player = tokio::spawn(async move {
            for step in script {
                match step {
                    ScriptStep::Emit(event) => {
                        if sink.send(event).is_err() {
                            return;
                        }
                    }
                    ScriptStep::Pause(duration) => tokio::time::sleep(duration).await,
                }
            }
        });
        *self.player.lock().unwrap_or_else(PoisonError::into_inner) = Some(player);

        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        Ok(format!("msg-{}", Uuid::new_v4()))
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        if let Some(player) = self.player.lock().unwrap_or_else(PoisonError::into_inner).take() {
            player.abort();
        }
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
