//! Agent
//!
//! Ties the conversation path together: a flushed transcript or a direct
//! mention goes through the response gate, the reply is sent in chunks, and
//! the exchange is recorded in memory.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::channels::{history_transcript, send_chunked, ChatTransport, InboundMessage};
use crate::config::Config;
use crate::debounce::{Flush, FlushHandler};
use crate::gate::ResponseGate;
use crate::memory::{ConversationRecord, Exchange, SharedMemory};
use crate::oracle::Oracle;
use crate::sentiment::SentimentCollector;

/// Identity and conversation settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    pub personality: String,
    pub home_channel: String,
    /// Channel messages fetched as gate context
    pub recent_history_limit: usize,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.agent_name.clone(),
            personality: config.personality.clone(),
            home_channel: config.home_channel.clone(),
            recent_history_limit: config.recent_history_limit,
        }
    }
}

/// Snapshot logged after startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateReport {
    pub home_channel: String,
    pub secondary_channel: Option<String>,
    pub location: String,
    pub conversations: usize,
    pub goal: String,
}

pub struct Agent {
    settings: AgentSettings,
    transport: Arc<dyn ChatTransport>,
    memory: Arc<SharedMemory>,
    gate: ResponseGate,
    sentiment: SentimentCollector,
    /// Channel of the latest mention
    secondary_channel: Mutex<Option<String>>,
    location: Mutex<String>,
}

impl Agent {
    pub fn new(
        settings: AgentSettings,
        transport: Arc<dyn ChatTransport>,
        oracle: Arc<dyn Oracle>,
        memory: Arc<SharedMemory>,
    ) -> Self {
        let gate = ResponseGate::new(Arc::clone(&oracle), &settings.name, &settings.personality);
        let sentiment = SentimentCollector::new(oracle, &settings.name, &settings.personality);
        let location = Mutex::new(settings.home_channel.clone());

        Self {
            settings,
            transport,
            memory,
            gate,
            sentiment,
            secondary_channel: Mutex::new(None),
            location,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn memory(&self) -> &Arc<SharedMemory> {
        &self.memory
    }

    pub fn secondary_channel(&self) -> Option<String> {
        self.secondary_channel.lock().clone()
    }

    pub fn location(&self) -> String {
        self.location.lock().clone()
    }

    /// True for messages the agent posted itself
    pub fn is_own_message(&self, message: &InboundMessage) -> bool {
        message.author_id == self.transport.self_id()
    }

    /// Handle a direct mention without debouncing
    pub async fn handle_mention(&self, message: &InboundMessage) -> Option<ConversationRecord> {
        *self.secondary_channel.lock() = Some(message.channel_name.clone());
        *self.location.lock() = message.channel_name.clone();

        self.sentiment
            .collect(&self.memory, &message.author_display_name, &message.content)
            .await;

        let transcript = format!("{}: {}", message.author_display_name, message.content);
        self.respond(
            &message.channel_id,
            &message.channel_name,
            &transcript,
            &message.content,
        )
        .await
    }

    /// Gate `transcript`, send the reply and record the exchange under
    /// `location`. Returns the recorded exchange when a reply was produced.
    pub async fn respond(
        &self,
        channel_id: &str,
        location: &str,
        transcript: &str,
        recorded_message: &str,
    ) -> Option<ConversationRecord> {
        let context = self.context_for(channel_id, transcript).await;
        let reply = self.gate.decide(&context).await?;

        let delivered = send_chunked(self.transport.as_ref(), channel_id, &reply).await;
        if delivered == 0 {
            warn!("💻 No part of the reply reached channel {}", channel_id);
        }

        let exchange = Exchange::new(location, recorded_message);
        Some(self.memory.record_exchange(&exchange, &reply).await)
    }

    /// Recent channel history as gate context, or the transcript itself when
    /// history is unavailable
    async fn context_for(&self, channel_id: &str, fallback: &str) -> String {
        match self
            .transport
            .fetch_recent_messages(channel_id, self.settings.recent_history_limit)
            .await
        {
            Ok(history) if !history.is_empty() => history_transcript(&history),
            Ok(_) => fallback.to_string(),
            Err(e) => {
                warn!("💻 Failed to fetch history for {}: {}", channel_id, e);
                fallback.to_string()
            }
        }
    }

    /// Log and return the current state
    pub async fn state_report(&self) -> StateReport {
        let (conversations, goal) = self
            .memory
            .read(|m| (m.conversations().len(), m.goal().to_string()))
            .await;

        let report = StateReport {
            home_channel: self.settings.home_channel.clone(),
            secondary_channel: self.secondary_channel(),
            location: self.location(),
            conversations,
            goal,
        };

        info!(
            "💻 {} State:\n  - Home Channel: {}\n  - Secondary Channel: {}\n  - Conversations Logged: {}\n  - Current Goal: {}",
            self.settings.name,
            report.home_channel,
            report.secondary_channel.as_deref().unwrap_or("None"),
            report.conversations,
            report.goal
        );
        report
    }
}

#[async_trait]
impl FlushHandler for Agent {
    async fn handle_flush(&self, flush: Flush) {
        let transcript = flush.transcript();
        info!("💻 Full conversation context: {}", transcript);

        self.respond(&flush.channel_id, &flush.channel_name, &transcript, &transcript)
            .await;
    }
}
