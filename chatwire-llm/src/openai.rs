//! Backend for OpenAI-compatible chat completion endpoints.
//!
//! Each `send` runs one turn on a background task: the completion is
//! streamed as server-sent events, content fragments become `Delta` events,
//! and any tool calls are executed locally and fed back until the model
//! answers with text. The turn ends with `Idle` or `Error`.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use openai_dive::v1::resources::chat::{ChatCompletionChunkResponse, ChatMessage, ToolCall};
use uuid::Uuid;

use chatwire_core::{
    event_channel, Backend, BackendError, BackendSession, EventSink, EventStream, SessionConfig,
    SessionEvent, ToolSet,
};

use crate::config::OpenAiConfig;
use crate::wire::{
    assistant_message, chat_request, delta_parts, system_message, system_prompt, tool_message,
    user_message, ToolCallAccumulator,
};

/// Rounds of tool execution allowed in a single turn.
pub const MAX_TOOL_ROUNDS: usize = 10;

pub struct OpenAiBackend {
    config: Arc<OpenAiConfig>,
    client: RwLock<Option<reqwest::Client>>,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn verify(&self, client: &reqwest::Client) -> Result<(), BackendError> {
        let url = self.config.endpoint("models");
        debug!("Verifying backend at {}", url);
        let mut request = client.get(&url);
        if let Some(key) = self.config.api_key() {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn start(&self) -> Result<(), BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .build()
            .map_err(|e| BackendError::Connection(format!("failed to build HTTP client: {}", e)))?;

        if self.config.verify_on_start {
            self.verify(&client).await?;
        }

        info!("Connected to {}", self.config.base_url);
        *self.client.write().await = Some(client);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BackendError> {
        if self.client.write().await.take().is_some() {
            info!("Disconnected from {}", self.config.base_url);
        }
        Ok(())
    }

    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Box<dyn BackendSession>, BackendError> {
        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or(BackendError::NotStarted)?;

        let mut history = Vec::new();
        if let Some(system) = system_prompt(self.config.default_system_prompt.as_deref(), &config) {
            history.push(system_message(system));
        }

        let (sink, events) = event_channel();
        Ok(Box::new(OpenAiSession {
            id: format!("sess_{}", Uuid::new_v4()),
            turn: Arc::new(TurnContext {
                client,
                backend: self.config.clone(),
                session: config,
                history: Mutex::new(history),
                sink,
            }),
            events: Some(events),
            task: Mutex::new(None),
        }))
    }
}

struct OpenAiSession {
    id: String,
    turn: Arc<TurnContext>,
    events: Option<EventStream>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl BackendSession for OpenAiSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    async fn send(&self, prompt: &str) -> Result<String, BackendError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(BackendError::Protocol(format!(
                "session {} already has a turn in progress",
                self.id
            )));
        }

        self.turn.push(user_message(prompt));
        let turn = self.turn.clone();
        let session_id = self.id.clone();
        *task = Some(tokio::spawn(async move {
            let terminal = match turn.run().await {
                Ok(()) => SessionEvent::Idle,
                Err(e) => {
                    warn!("[] - [{}] Turn failed: {}", session_id, e);
                    SessionEvent::Error(e.to_string())
                }
            };
            let _ = turn.sink.send(terminal);
        }));

        Ok(format!("msg_{}", Uuid::new_v4()))
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        debug!("[] - [{}] Session closed", self.id);
        Ok(())
    }
}

struct TurnContext {
    client: reqwest::Client,
    backend: Arc<OpenAiConfig>,
    session: SessionConfig,
    history: Mutex<Vec<ChatMessage>>,
    sink: EventSink,
}

/// What one streamed completion produced.
struct Round {
    content: String,
    tool_calls: Vec<ToolCall>,
}

impl TurnContext {
    fn push(&self, message: ChatMessage) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.sink.send(event);
    }

    async fn run(&self) -> Result<(), BackendError> {
        for round in 0..=MAX_TOOL_ROUNDS {
            let Round {
                content,
                tool_calls,
            } = self.stream_round().await?;

            if !content.is_empty() {
                self.emit(SessionEvent::Message(content.clone()));
            }
            self.push(assistant_message(content, tool_calls.clone()));

            if tool_calls.is_empty() {
                return Ok(());
            }

            debug!("Round {}: executing {} tool call(s)", round, tool_calls.len());
            for call in tool_calls {
                let output = execute_tool(self.session.tools.as_ref(), &call).await;
                self.push(tool_message(call.id, output));
            }
        }

        Err(BackendError::Protocol(format!(
            "tool call limit of {} rounds exceeded",
            MAX_TOOL_ROUNDS
        )))
    }

    async fn stream_round(&self) -> Result<Round, BackendError> {
        let body = chat_request(&self.session, self.messages())?;

        let mut request = self
            .client
            .post(self.backend.endpoint("chat/completions"))
            .json(&body);
        if let Some(key) = self.backend.api_key() {
            request = request.bearer_auth(key);
        }

        let mut source = EventSource::new(request)
            .map_err(|e| BackendError::Protocol(format!("request cannot be streamed: {}", e)))?;

        let mut content = String::new();
        let mut calls = ToolCallAccumulator::default();

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data.trim() == "[DONE]" {
                        break;
                    }
                    let chunk: ChatCompletionChunkResponse = serde_json::from_str(&message.data)
                        .map_err(|e| {
                            BackendError::Protocol(format!("malformed completion chunk: {}", e))
                        })?;
                    for choice in chunk.choices {
                        let (text, tool_calls) = delta_parts(choice.delta);
                        if let Some(text) = text {
                            content.push_str(&text);
                            self.emit(SessionEvent::Delta(text));
                        }
                        for delta in tool_calls {
                            if let Err(e) = calls.push(delta) {
                                source.close();
                                return Err(e);
                            }
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    source.close();
                    let message = response.text().await.unwrap_or_default();
                    return Err(BackendError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    source.close();
                    return Err(BackendError::Connection(e.to_string()));
                }
            }
        }
        source.close();

        Ok(Round {
            content,
            tool_calls: calls.finish(),
        })
    }
}

/// Run a tool handler on the blocking pool. Failures come back as text.
async fn execute_tool(tools: Option<&ToolSet>, call: &ToolCall) -> String {
    let Some(tool) = tools.and_then(|t| t.get(&call.function.name)).cloned() else {
        warn!("Model requested unknown tool '{}'", call.function.name);
        return format!("Error: unknown tool '{}'", call.function.name);
    };

    let arguments = match serde_json::from_str(&call.function.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            return format!(
                "Error: arguments for '{}' are not valid JSON: {}",
                call.function.name, e
            )
        }
    };

    debug!(tool = %tool.name, "Executing tool");
    match tokio::task::spawn_blocking(move || tool.invoke(arguments)).await {
        Ok(output) => output,
        Err(e) => format!("Error: tool '{}' failed: {}", call.function.name, e),
    }
}
