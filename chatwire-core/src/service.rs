use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::EventAggregator;
use crate::backend::Backend;
use crate::config::{ChatConfig, SessionSettings};
use crate::error::ChatError;
use crate::reply::{Completion, Reply, Termination};
use crate::session::SessionFactory;
use crate::start_guard::StartGuard;
use crate::streaming::reply_stream;
use crate::tools::{Tool, ToolSet};
use crate::waiter::{wait_for_completion, Deadline};

/// Request/response front end over an event-driven completion backend.
///
/// One backend connection is shared by every call. Each call gets its own
/// session, its own event stream and its own buffer.
pub struct ChatService {
    backend: Arc<dyn Backend>,
    guard: StartGuard,
    factory: SessionFactory,
    response_timeout: Duration,
}

impl ChatService {
    pub fn new(backend: Arc<dyn Backend>, config: ChatConfig) -> Self {
        let settings = Arc::new(SessionSettings::new(&config));
        Self {
            backend,
            guard: StartGuard::new(),
            factory: SessionFactory::new(settings),
            response_timeout: config.response_timeout(),
        }
    }

    pub fn settings(&self) -> &Arc<SessionSettings> {
        self.factory.settings()
    }

    pub fn model(&self) -> String {
        self.settings().model()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.settings().set_model(model);
    }

    pub fn set_system_message(&self, message: Option<String>) {
        self.settings().set_system_message(message);
    }

    pub fn set_tools(&self, tools: impl IntoIterator<Item = Tool>) {
        self.settings().set_tools(tools.into_iter().collect::<ToolSet>());
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn is_started(&self) -> bool {
        self.guard.is_started()
    }

    /// Ask a question and return the reply text.
    ///
    /// Only a failed backend start or a failed session open is returned as an
    /// error; every other failure is reported inside the text.
    pub async fn ask(&self, prompt: &str, cancel: CancellationToken) -> Result<String, ChatError> {
        self.ask_detailed(prompt, cancel).await.map(Completion::into_text)
    }

    /// Like [`ChatService::ask`] but keeps the typed reply and termination.
    pub async fn ask_detailed(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<Completion, ChatError> {
        let request_id = Uuid::new_v4().to_string();
        let deadline = Deadline::new(cancel, self.response_timeout);
        info!("[{}] Ask ({} chars)", request_id, prompt.len());

        self.guard
            .ensure_started(&self.backend)
            .await
            .map_err(ChatError::Start)?;

        let mut session = self
            .factory
            .open(self.backend.as_ref(), &request_id)
            .await
            .map_err(ChatError::OpenSession)?;
        let session_id = session.id().to_string();
        let mut aggregator = EventAggregator::new(session_id.clone());

        let termination = match (session.take_events(), session.session()) {
            (Some(mut events), Some(handle)) => {
                wait_for_completion(
                    handle,
                    &mut events,
                    &mut aggregator,
                    prompt,
                    &deadline,
                    &request_id,
                )
                .await
            }
            _ => {
                warn!(
                    "[{}] - [{}] Session has no event stream",
                    request_id, session_id
                );
                Termination::Disconnected
            }
        };

        session.close().await;

        let (buffer, last_error) = aggregator.into_parts();
        let reply = Reply::reduce(buffer, last_error);
        info!(
            "[{}] - [{}] Ask finished: {}",
            request_id, session_id, termination
        );

        Ok(Completion {
            request_id,
            session_id,
            reply,
            termination,
        })
    }

    /// Stream-shaped variant of [`ChatService::ask`]; yields at most one item.
    pub fn ask_streaming<'a>(
        &'a self,
        prompt: &'a str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<String, ChatError>> + Send + 'a {
        reply_stream(self, prompt, cancel)
    }

    /// Stop the backend (if it was started) and release it.
    ///
    /// Consumes the service, so it runs once and no call can outlive it.
    pub async fn shutdown(self) {
        self.guard.shutdown(self.backend.as_ref()).await;
        info!("Chat service shut down");
    }
}
