//! Glue between `chatwire-core` sessions and the `openai_dive` chat types.

use openai_dive::v1::resources::chat::{
    ChatCompletionParameters, ChatCompletionParametersBuilder, ChatCompletionTool, ChatMessage,
    ChatMessageContent, DeltaChatMessage, DeltaFunction, DeltaToolCall, Function, ToolCall,
};
use serde_json::json;

use chatwire_core::{BackendError, SessionConfig, SystemMessageMode, ToolSet};

/// Tool-call indexes may skip ahead of the calls seen so far by at most this much.
pub const MAX_TOOL_INDEX_GAP: usize = 64;

pub fn system_message(content: String) -> ChatMessage {
    ChatMessage::System {
        content: ChatMessageContent::Text(content),
        name: None,
    }
}

pub fn user_message(content: &str) -> ChatMessage {
    ChatMessage::User {
        content: ChatMessageContent::Text(content.to_string()),
        name: None,
    }
}

pub fn assistant_message(content: String, tool_calls: Vec<ToolCall>) -> ChatMessage {
    ChatMessage::Assistant {
        content: (!content.is_empty()).then(|| ChatMessageContent::Text(content)),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        name: None,
        audio: None,
        reasoning_content: None,
        refusal: None,
    }
}

pub fn tool_message(tool_call_id: String, content: String) -> ChatMessage {
    ChatMessage::Tool {
        content: ChatMessageContent::Text(content),
        tool_call_id,
    }
}

/// Completion request for one round of a session.
pub fn chat_request(
    config: &SessionConfig,
    messages: Vec<ChatMessage>,
) -> Result<ChatCompletionParameters, BackendError> {
    let mut parameters = ChatCompletionParametersBuilder::default()
        .model(config.model.clone())
        .messages(messages)
        .stream(config.streaming)
        .build()
        .map_err(|e| BackendError::Protocol(format!("invalid completion request: {}", e)))?;

    if let Some(tools) = config.tools.as_ref().filter(|t| !t.is_empty()) {
        parameters.tools = Some(completion_tools(tools)?);
    }
    Ok(parameters)
}

fn completion_tools(tools: &ToolSet) -> Result<Vec<ChatCompletionTool>, BackendError> {
    tools
        .iter()
        .map(|tool| {
            serde_json::from_value(json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            }))
            .map_err(|e| {
                BackendError::Protocol(format!("tool '{}' cannot be declared: {}", tool.name, e))
            })
        })
        .collect()
}

/// The system instructions for a session, combining the backend default with
/// the session's own message according to its mode.
pub fn system_prompt(default: Option<&str>, config: &SessionConfig) -> Option<String> {
    let default = default.filter(|d| !d.trim().is_empty());
    match (&config.system_message, default) {
        (None, default) => default.map(str::to_string),
        (Some(custom), None) => Some(custom.content.clone()),
        (Some(custom), Some(default)) => match custom.mode {
            SystemMessageMode::Append => Some(format!("{}\n\n{}", default, custom.content)),
            SystemMessageMode::Replace => Some(custom.content.clone()),
        },
    }
}

/// Text and tool-call fragments carried by one streamed delta.
pub fn delta_parts(delta: DeltaChatMessage) -> (Option<String>, Vec<DeltaToolCall>) {
    match delta {
        DeltaChatMessage::Assistant {
            content,
            tool_calls,
            ..
        } => (delta_text(content), delta_calls(tool_calls)),
        DeltaChatMessage::Untagged {
            content,
            tool_calls,
            ..
        } => (delta_text(content), delta_calls(tool_calls)),
        _ => (None, Vec::new()),
    }
}

fn delta_text(content: impl Into<Option<ChatMessageContent>>) -> Option<String> {
    match content.into() {
        Some(ChatMessageContent::Text(text)) if !text.is_empty() => Some(text),
        _ => None,
    }
}

fn delta_calls(tool_calls: impl Into<Option<Vec<DeltaToolCall>>>) -> Vec<DeltaToolCall> {
    tool_calls.into().unwrap_or_default()
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles tool calls that arrive split across many chunks.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PartialCall>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: DeltaToolCall) -> Result<(), BackendError> {
        let index: Option<u32> = delta.index.into();
        let index = index.unwrap_or(0) as usize;
        if index > self.calls.len() + MAX_TOOL_INDEX_GAP {
            return Err(BackendError::Protocol(format!(
                "tool call index {} is out of range ({} calls so far)",
                index,
                self.calls.len()
            )));
        }
        if self.calls.len() <= index {
            self.calls.resize_with(index + 1, PartialCall::default);
        }

        let call = &mut self.calls[index];
        let id: Option<String> = delta.id.into();
        if let Some(id) = id {
            call.id.push_str(&id);
        }
        let function: Option<DeltaFunction> = delta.function.into();
        if let Some(function) = function {
            let name: Option<String> = function.name.into();
            if let Some(name) = name {
                call.name.push_str(&name);
            }
            let arguments: Option<String> = function.arguments.into();
            if let Some(arguments) = arguments {
                call.arguments.push_str(&arguments);
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.calls.iter().all(|c| c.name.is_empty())
    }

    /// Completed calls in index order. Calls without a name are dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .enumerate()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    call.id
                },
                r#type: "function".to_string(),
                function: Function {
                    name: call.name,
                    arguments: if call.arguments.trim().is_empty() {
                        "{}".to_string()
                    } else {
                        call.arguments
                    },
                },
            })
            .collect()
    }
}
