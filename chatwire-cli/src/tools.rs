use schemars::JsonSchema;
use serde::Deserialize;

use chatwire_core::Tool;

#[derive(Deserialize, JsonSchema)]
struct CurrentTimeParams {
    /// Report the time in UTC instead of local time
    #[serde(default)]
    utc: bool,
}

#[derive(Deserialize, JsonSchema)]
struct WordCountParams {
    /// Text to count words in
    text: String,
}

/// Tools registered by the command-line client.
pub fn builtin() -> Vec<Tool> {
    vec![
        Tool::typed::<CurrentTimeParams, _>(
            "current_time",
            "Get the current date and time in RFC 3339 format",
            |params| {
                if params.utc {
                    chrono::Utc::now().to_rfc3339()
                } else {
                    chrono::Local::now().to_rfc3339()
                }
            },
        ),
        Tool::typed::<WordCountParams, _>(
            "word_count",
            "Count the words in a piece of text",
            |params| params.text.split_whitespace().count().to_string(),
        ),
    ]
}
