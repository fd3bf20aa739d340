//! Conversation and sentiment ledgers
//!
//! The conversation ledger is a rolling window: appends evict the oldest
//! entry past the cap, and consolidation can shrink an oversized ledger down
//! to an archival floor. Both rules are independent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where and what the agent was answering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Channel name the message arrived in
    pub location: String,
    /// Message text (or aggregated transcript) that was answered
    pub message: String,
}

impl Exchange {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// A single request/response pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub location: String,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered, capped log of exchanges (oldest first)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationLedger {
    records: Vec<ConversationRecord>,
}

impl ConversationLedger {
    /// Append a record, then drop the oldest entries while over `cap`.
    /// Returns how many entries were evicted.
    pub fn push(&mut self, record: ConversationRecord, cap: usize) -> usize {
        self.records.push(record);

        let excess = self.records.len().saturating_sub(cap);
        if excess > 0 {
            self.records.drain(..excess);
        }
        excess
    }

    /// Keep only the most recent `floor` entries, but only when the ledger
    /// has grown past `cap`. Returns how many entries were archived away.
    pub fn archive(&mut self, cap: usize, floor: usize) -> usize {
        if self.records.len() <= cap {
            return 0;
        }

        let removed = self.records.len() - floor.min(self.records.len());
        self.records.drain(..removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ConversationRecord] {
        &self.records
    }

    pub fn latest(&self) -> Option<&ConversationRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationRecord> {
        self.records.iter()
    }
}

/// Per-author emoji reaction tokens, append-only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentimentLedger {
    by_author: BTreeMap<String, Vec<String>>,
}

impl SentimentLedger {
    /// Append tokens to an author's sequence, creating it if absent
    pub fn append<I>(&mut self, author: &str, tokens: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let entry = self.by_author.entry(author.to_string()).or_default();
        let before = entry.len();
        entry.extend(tokens);
        entry.len() - before
    }

    pub fn for_author(&self, author: &str) -> &[String] {
        self.by_author
            .get(author)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn authors(&self) -> impl Iterator<Item = &str> {
        self.by_author.keys().map(String::as_str)
    }

    pub fn total_tokens(&self) -> usize {
        self.by_author.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_author.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> ConversationRecord {
        ConversationRecord {
            location: "general".to_string(),
            message: format!("Message {}", n),
            response: format!("Reply {}", n),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut ledger = ConversationLedger::default();
        for i in 0..5 {
            ledger.push(record(i), 3);
        }
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.records()[0].message, "Message 2");
        assert_eq!(ledger.latest().unwrap().message, "Message 4");
    }

    #[test]
    fn test_push_reports_eviction() {
        let mut ledger = ConversationLedger::default();
        assert_eq!(ledger.push(record(0), 1), 0);
        assert_eq!(ledger.push(record(1), 1), 1);
    }

    #[test]
    fn test_archive_only_above_cap() {
        let mut ledger = ConversationLedger::default();
        for i in 0..50 {
            ledger.push(record(i), usize::MAX);
        }
        assert_eq!(ledger.archive(50, 25), 0);
        assert_eq!(ledger.len(), 50);

        ledger.push(record(50), usize::MAX);
        assert_eq!(ledger.archive(50, 25), 26);
        assert_eq!(ledger.len(), 25);
        assert_eq!(ledger.records()[0].message, "Message 26");
        assert_eq!(ledger.latest().unwrap().message, "Message 50");
    }

    #[test]
    fn test_sentiment_append() {
        let mut ledger = SentimentLedger::default();
        assert!(ledger.for_author("alice").is_empty());

        let added = ledger.append("alice", vec!["🙂".to_string(), "🔥".to_string()]);
        assert_eq!(added, 2);
        ledger.append("alice", vec!["🙂".to_string()]);
        ledger.append("bob", Vec::new());

        assert_eq!(ledger.for_author("alice"), ["🙂", "🔥", "🙂"]);
        assert!(ledger.for_author("bob").is_empty());
        assert_eq!(ledger.authors().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(ledger.total_tokens(), 3);
    }
}
