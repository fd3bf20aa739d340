//! Chat Platform Channels
//!
//! The transport abstraction the agent talks through, plus the Discord
//! implementation (REST login, history, send and inbound polling).

pub mod discord;
pub mod traits;

pub use discord::{DiscordConfig, DiscordTransport};
pub use traits::{
    chunk_text, history_transcript, send_chunked, ChannelError, ChatTransport, HistoryMessage,
    InboundMessage,
};
