use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::Backend;
use crate::config::{SessionSettings, SettingsSnapshot};
use crate::error::BackendError;

use super::{ScopedSession, SessionConfig, SystemMessage, SystemMessageMode};

/// Builds per-call session configurations from the live settings and opens
/// sessions against the backend.
pub struct SessionFactory {
    settings: Arc<SessionSettings>,
}

impl SessionFactory {
    pub fn new(settings: Arc<SessionSettings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Arc<SessionSettings> {
        &self.settings
    }

    /// Snapshot the current settings into a fresh configuration
    /// - streaming is always requested from the transport
    /// - tools only when at least one is registered
    /// - system message only when non-blank, appended to the backend defaults
    pub fn build_config(&self) -> SessionConfig {
        let SettingsSnapshot {
            model,
            system_message,
            tools,
        } = self.settings.snapshot();

        let mut config = SessionConfig::new(model);
        config.streaming = true;
        if !tools.is_empty() {
            config.tools = Some(tools);
        }
        config.system_message = system_message
            .filter(|content| !content.trim().is_empty())
            .map(|content| SystemMessage {
                content,
                mode: SystemMessageMode::Append,
            });
        config
    }

    /// Open a session scoped to one call. The returned guard releases it on drop.
    pub async fn open(
        &self,
        backend: &dyn Backend,
        request_id: &str,
    ) -> Result<ScopedSession, BackendError> {
        let config = self.build_config();
        info!(
            "[{}] Creating session model={} tools={:?} system_message={}",
            request_id,
            config.model,
            config.tool_names(),
            config.system_message.is_some()
        );

        let session = backend.create_session(config).await?;
        debug!("[{}] - [{}] Session created", request_id, session.id());

        Ok(ScopedSession::new(session, request_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChatConfig;
    use crate::tools::Tool;
    use serde_json::Value;

    fn factory(config: ChatConfig) -> SessionFactory {
        SessionFactory::new(Arc::new(SessionSettings::new(&config)))
    }

    #[test]
    fn config_always_requests_streaming() {
        let config = factory(ChatConfig::default()).build_config();
        assert!(config.streaming);
    }

    #[test]
    fn tools_omitted_when_none_registered() {
        let config = factory(ChatConfig::default()).build_config();
        assert!(config.tools.is_none());
    }

    #[test]
    fn tools_included_in_registration_order() {
        let factory = factory(ChatConfig::default());
        factory
            .settings()
            .register_tool(Tool::new("b", "", Value::Null, |_| String::new()));
        factory
            .settings()
            .register_tool(Tool::new("a", "", Value::Null, |_| String::new()));

        let config = factory.build_config();
        assert_eq!(config.tool_names(), vec!["b", "a"]);
    }

    #[test]
    fn blank_system_message_is_dropped() {
        let config = factory(ChatConfig::default().with_system_message("  \n")).build_config();
        assert!(config.system_message.is_none());
    }

    #[test]
    fn system_message_uses_append_mode() {
        let config = factory(ChatConfig::default().with_system_message("Answer in French.")).build_config();
        assert_eq!(
            config.system_message,
            Some(SystemMessage {
                content: "Answer in French.".to_string(),
                mode: SystemMessageMode::Append,
            })
        );
    }

    #[test]
    fn model_change_affects_next_config_only() {
        let factory = factory(ChatConfig::default().with_model("first"));
        let earlier = factory.build_config();
        factory.settings().set_model("second");

        assert_eq!(earlier.model, "first");
        assert_eq!(factory.build_config().model, "second");
    }
}
