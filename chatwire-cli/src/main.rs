mod command;
mod config;
mod repl;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chatwire_core::ChatService;
use chatwire_llm::OpenAiBackend;

use crate::config::CliConfig;
use crate::repl::{ask_interruptible, print_reply, Repl};

#[derive(Parser, Debug)]
#[command(name = "chatwire", version, about = "Ask an OpenAI-compatible model from the terminal")]
struct Cli {
    /// Question to ask; starts an interactive session when omitted
    prompt: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    model: Option<String>,

    /// System message appended to the backend's defaults
    #[arg(short, long)]
    system: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    base_url: Option<String>,

    /// Response ceiling in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Config file (defaults to <config dir>/chatwire/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the stream-shaped interface
    #[arg(long)]
    stream: bool,
}

impl Cli {
    fn apply(&self, config: &mut CliConfig) {
        if let Some(model) = &self.model {
            config.chat.model = model.clone();
        }
        if let Some(system) = &self.system {
            config.chat.system_message = Some(system.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.backend.base_url = base_url.clone();
        }
        if let Some(timeout) = self.timeout {
            config.chat = config.chat.clone().with_response_timeout(Duration::from_secs(timeout));
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    debug!(
        "Configuration: model={} base_url={} timeout={}s",
        config.chat.model, config.backend.base_url, config.chat.response_timeout_secs
    );

    let backend = Arc::new(OpenAiBackend::new(config.backend.clone()));
    let service = ChatService::new(backend, config.chat.clone());
    service.set_tools(tools::builtin());

    let result = match &cli.prompt {
        Some(prompt) => ask_interruptible(&service, prompt, cli.stream)
            .await
            .map(|chunks| print_reply(&chunks))
            .map_err(anyhow::Error::from),
        None => Repl::new(&service, cli.stream).run().await,
    };

    service.shutdown().await;
    result
}
