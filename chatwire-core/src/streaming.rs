//! Stream-shaped wrapper around the non-streaming call.
//!
//! The whole answer is produced first and then published as a single item.
//! Deltas are not forwarded: they are not guaranteed to carry the text the
//! backend produces after running tools, so only the final reply is trusted.

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::service::ChatService;

/// Lazily runs `ask` on first poll and yields its reply, or nothing if the
/// reply is empty. Start failures are yielded as the single `Err` item.
pub fn reply_stream<'a>(
    service: &'a ChatService,
    prompt: &'a str,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String, ChatError>> + Send + 'a {
    stream::once(async move { service.ask(prompt, cancel).await }).filter(|result| {
        future::ready(match result {
            Ok(text) => !text.is_empty(),
            Err(_) => true,
        })
    })
}
