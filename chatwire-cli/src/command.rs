use crate::repl::Repl;

impl Repl<'_> {
    pub(crate) fn list_command() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/exit", "exit chatwire"),
            ("/model", "show or set the model: /model [id]"),
            ("/system", "show, set, or clear (/system -) the system message"),
            ("/tools", "list registered tools"),
            ("/stream", "toggle stream-shaped replies: /stream [on | off]"),
            ("/help", "list commands"),
        ]
    }

    /// Run a slash command and return the text to show.
    pub(crate) fn handle_command(&mut self, command: &str) -> String {
        let mut parts = command.splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or_default();
        let rest = parts.next().map(str::trim).filter(|r| !r.is_empty());

        match cmd {
            "/exit" | "/quit" => {
                self.exit = true;
                "bye".to_string()
            }
            "/model" => match rest {
                Some(model) => {
                    self.service.set_model(model);
                    format!("model set to {} (applies to the next question)", model)
                }
                None => format!("model: {}", self.service.model()),
            },
            "/system" => match rest {
                Some("-") => {
                    self.service.set_system_message(None);
                    "system message cleared".to_string()
                }
                Some(text) => {
                    self.service.set_system_message(Some(text.to_string()));
                    "system message set".to_string()
                }
                None => match self.service.settings().system_message() {
                    Some(text) => format!("system message: {}", text),
                    None => "no system message".to_string(),
                },
            },
            "/tools" => {
                let tools = self.service.settings().tools();
                if tools.is_empty() {
                    "no tools registered".to_string()
                } else {
                    tools
                        .iter()
                        .map(|t| format!("  {} - {}", t.name, t.description))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            "/stream" => {
                match rest {
                    Some("on") => self.stream = true,
                    Some("off") => self.stream = false,
                    None => self.stream = !self.stream,
                    Some(other) => return format!("unknown stream mode: {} (use on | off)", other),
                }
                format!("stream mode {}", if self.stream { "on" } else { "off" })
            }
            "/help" => Self::list_command()
                .into_iter()
                .map(|(cmd, desc)| format!("  {:<8} {}", cmd, desc))
                .collect::<Vec<_>>()
                .join("\n"),
            other => format!("unknown command: {} (try /help)", other),
        }
    }
}
