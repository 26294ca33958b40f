//! OpenAI-compatible completion backend for `chatwire-core`.

pub mod config;
pub mod openai;
pub mod wire;

pub use config::OpenAiConfig;
pub use openai::{OpenAiBackend, MAX_TOOL_ROUNDS};
