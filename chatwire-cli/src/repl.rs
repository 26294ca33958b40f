use std::io::Write;
use std::pin::pin;

use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use chatwire_core::{ChatError, ChatService};

/// Ask one question; Ctrl-C fires the call's cancellation token.
pub async fn ask_interruptible(
    service: &ChatService,
    prompt: &str,
    stream: bool,
) -> Result<Vec<String>, ChatError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = if stream {
        let replies = pin!(service.ask_streaming(prompt, cancel));
        replies.collect::<Vec<_>>().await.into_iter().collect()
    } else {
        service.ask(prompt, cancel).await.map(|text| vec![text])
    };

    watcher.abort();
    result
}

pub fn print_reply(chunks: &[String]) {
    let mut stdout = std::io::stdout().lock();
    for chunk in chunks {
        let _ = write!(stdout, "{}", chunk);
    }
    let _ = writeln!(stdout);
    let _ = stdout.flush();
}

pub struct Repl<'a> {
    pub(crate) service: &'a ChatService,
    pub(crate) stream: bool,
    pub(crate) exit: bool,
}

impl<'a> Repl<'a> {
    pub fn new(service: &'a ChatService, stream: bool) -> Self {
        Self {
            service,
            stream,
            exit: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("chatwire (model \x1b[1m{}\x1b[0m), /help for commands", self.service.model());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while !self.exit {
            print!("> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('/') {
                println!("{}", self.handle_command(line));
                continue;
            }

            match ask_interruptible(self.service, line, self.stream).await {
                Ok(chunks) => print_reply(&chunks),
                Err(e) => eprintln!("\x1b[31m{}\x1b[0m", e),
            }
        }
        Ok(())
    }
}
