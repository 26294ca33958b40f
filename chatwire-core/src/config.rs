use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tools::{Tool, ToolSet};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 120;

/// Static configuration for a chat service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    /// Model identifier used for new sessions
    pub model: String,
    /// Extra system instructions appended to the backend's defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// Hard ceiling for a single call, in seconds
    pub response_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_message: None,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
        }
    }
}

impl ChatConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// Mutable settings read at the start of every call.
///
/// Writes only affect calls that start afterwards; the last write wins.
#[derive(Debug)]
pub struct SessionSettings {
    model: RwLock<String>,
    system_message: RwLock<Option<String>>,
    tools: RwLock<ToolSet>,
}

/// Point-in-time copy of [`SessionSettings`].
#[derive(Clone, Debug)]
pub struct SettingsSnapshot {
    pub model: String,
    pub system_message: Option<String>,
    pub tools: ToolSet,
}

impl SessionSettings {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            model: RwLock::new(config.model.clone()),
            system_message: RwLock::new(config.system_message.clone()),
            tools: RwLock::new(ToolSet::new()),
        }
    }

    pub fn model(&self) -> String {
        self.model.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = model.into();
    }

    pub fn system_message(&self) -> Option<String> {
        self.system_message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_system_message(&self, message: Option<String>) {
        *self
            .system_message
            .write()
            .unwrap_or_else(PoisonError::into_inner) = message;
    }

    pub fn tools(&self) -> ToolSet {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_tools(&self, tools: ToolSet) {
        *self.tools.write().unwrap_or_else(PoisonError::into_inner) = tools;
    }

    pub fn register_tool(&self, tool: Tool) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tool);
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            model: self.model(),
            system_message: self.system_message(),
            tools: self.tools(),
        }
    }
}
