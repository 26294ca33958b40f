mod factory;
mod lifecycle;

pub use factory::SessionFactory;
pub use lifecycle::ScopedSession;

use crate::tools::ToolSet;

/// How a session's system message combines with the backend's own defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemMessageMode {
    Append,
    Replace,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemMessage {
    pub content: String,
    pub mode: SystemMessageMode,
}

/// Per-call session configuration. Built fresh for every call and never shared.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub model: String,
    pub streaming: bool,
    pub tools: Option<ToolSet>,
    pub system_message: Option<SystemMessage>,
}

impl SessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            streaming: true,
            tools: None,
            system_message: None,
        }
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.as_ref().map(|t| t.names()).unwrap_or_default()
    }
}
