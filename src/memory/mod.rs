//! Agent Memory
//!
//! The single persisted document describing everything the agent remembers:
//! its conversation ledger, latest reflections, per-author sentiments and the
//! embedding archive. Fields are private; every change goes through a method
//! so the ledger bounds hold after any update.

pub mod archive;
pub mod ledger;
pub mod shared;

pub use archive::{embed_record, EmbeddingArchive, EmbeddingKind, EmbeddingRecord};
pub use ledger::{ConversationLedger, ConversationRecord, Exchange, SentimentLedger};
pub use shared::SharedMemory;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::MemoryLimits;

/// Aggregate root, one per agent identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentMemory {
    conversations: ConversationLedger,
    summary: String,
    dream: String,
    goal: String,
    sentiment_summary: String,
    sentiment_update: String,
    sentiments: SentimentLedger,
    character_memories: BTreeMap<String, serde_json::Value>,
    embeddings: EmbeddingArchive,
}

impl AgentMemory {
    /// Record an answered exchange. The ledger is trimmed to the cap
    /// immediately; persisting is the caller's job.
    pub fn record_exchange(
        &mut self,
        exchange: &Exchange,
        response: &str,
        limits: MemoryLimits,
    ) -> ConversationRecord {
        let record = ConversationRecord {
            location: exchange.location.clone(),
            message: exchange.message.clone(),
            response: response.to_string(),
            timestamp: Utc::now(),
        };
        self.conversations.push(record.clone(), limits.conversation_cap);
        record
    }

    /// Shrink the ledger to the archival floor when it is over the cap
    pub fn archive_conversations(&mut self, limits: MemoryLimits) -> usize {
        self.conversations
            .archive(limits.conversation_cap, limits.archive_floor)
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = summary.into();
    }

    pub fn set_dream(&mut self, dream: impl Into<String>) {
        self.dream = dream.into();
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        self.goal = goal.into();
    }

    pub fn set_sentiment_summary(&mut self, summary: impl Into<String>) {
        self.sentiment_summary = summary.into();
    }

    pub fn set_sentiment_update(&mut self, update: impl Into<String>) {
        self.sentiment_update = update.into();
    }

    /// Append emoji tokens to an author's sentiment sequence
    pub fn append_sentiments(&mut self, author: &str, tokens: Vec<String>) -> usize {
        self.sentiments.append(author, tokens)
    }

    /// Append an embedding; the archive never shrinks
    pub fn push_embedding(&mut self, record: EmbeddingRecord) {
        self.embeddings.push(record);
    }

    pub fn conversations(&self) -> &ConversationLedger {
        &self.conversations
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn dream(&self) -> &str {
        &self.dream
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn sentiment_summary(&self) -> &str {
        &self.sentiment_summary
    }

    pub fn sentiment_update(&self) -> &str {
        &self.sentiment_update
    }

    pub fn sentiments(&self) -> &SentimentLedger {
        &self.sentiments
    }

    pub fn character_memories(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.character_memories
    }

    pub fn embeddings(&self) -> &EmbeddingArchive {
        &self.embeddings
    }
}
