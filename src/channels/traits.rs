//! Channel Trait Definitions
//!
//! The chat platform as the agent sees it: inbound messages, a recent history
//! fetch and plain-text send. Callers chunk outgoing text to the transport's
//! maximum message length before sending.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Error types for channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A message received from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message ID
    pub id: String,

    pub author_id: String,

    /// Name shown in transcripts and used as the sentiment key
    pub author_display_name: String,

    pub content: String,

    pub channel_id: String,

    /// Human-readable channel name, recorded as the conversation location
    pub channel_name: String,

    /// Whether the message explicitly mentions the agent
    pub mentions_self: bool,
}

/// One line of channel history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub author: String,
    pub content: String,
}

/// Chat platform transport
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name identifier
    fn name(&self) -> &str;

    /// The agent's own user ID on the platform
    fn self_id(&self) -> &str;

    /// Longest message the platform accepts
    fn max_message_len(&self) -> usize;

    /// Most recent messages of a channel, newest first
    async fn fetch_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, ChannelError>;

    /// Send one already-chunked message, returning its platform ID
    async fn send(&self, channel_id: &str, text: &str) -> Result<String, ChannelError>;
}

/// Newest-first history as chronological `author: content` lines
pub fn history_transcript(newest_first: &[HistoryMessage]) -> String {
    newest_first
        .iter()
        .rev()
        .map(|m| format!("{}: {}", m.author, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text into chunks of at most `max_len` characters, breaking at line
/// boundaries where possible and inside a line only when it alone is too long.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut started = false;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if started && current_len + 1 + line_len > max_len {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
            started = false;
        }
        if started {
            current.push('\n');
            current_len += 1;
        }

        if line_len > max_len {
            let chars: Vec<char> = line.chars().collect();
            let mut pieces: Vec<String> = chars
                .chunks(max_len)
                .map(|piece| piece.iter().collect())
                .collect();
            let last = pieces.pop().unwrap_or_default();
            chunks.extend(pieces);
            current_len = last.chars().count();
            current = last;
        } else {
            current.push_str(line);
            current_len += line_len;
        }
        started = true;
    }

    if started {
        chunks.push(current);
    }
    chunks
}

/// Send `text` in transport-sized chunks. Whitespace-only chunks are skipped
/// and a failed chunk does not stop the rest. Returns the number delivered.
pub async fn send_chunked(transport: &dyn ChatTransport, channel_id: &str, text: &str) -> usize {
    let mut delivered = 0;

    for chunk in chunk_text(text, transport.max_message_len()) {
        if chunk.trim().is_empty() {
            continue;
        }
        match transport.send(channel_id, &chunk).await {
            Ok(id) => {
                debug!("Sent chunk {} to {} ({} chars)", id, channel_id, chunk.chars().count());
                delivered += 1;
            }
            Err(e) => {
                error!("💻 Failed to send message via {}: {}", transport.name(), e);
            }
        }
    }

    delivered
}
