//! Embedding archive
//!
//! Every cognitive cycle output is embedded once and appended here. Entries
//! are never rewritten or removed.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::oracle::Oracle;

/// What produced an embedded text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
    Dream,
    FullMemorySummary,
    Goal,
    SentimentSummary,
    SentimentUpdate,
}

impl EmbeddingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dream => "dream",
            Self::FullMemorySummary => "full_memory_summary",
            Self::Goal => "goal",
            Self::SentimentSummary => "sentiment_summary",
            Self::SentimentUpdate => "sentiment_update",
        }
    }
}

impl fmt::Display for EmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One embedded text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    #[serde(rename = "type")]
    pub kind: EmbeddingKind,
    pub embedding: Vec<f32>,
    pub text: String,
}

/// Append-only sequence of embeddings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingArchive {
    records: Vec<EmbeddingRecord>,
}

impl EmbeddingArchive {
    pub fn push(&mut self, record: EmbeddingRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn count_of(&self, kind: EmbeddingKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }
}

/// Ask the oracle for an embedding of `text`. Failures are logged and
/// produce no record.
pub async fn embed_record(
    oracle: &dyn Oracle,
    kind: EmbeddingKind,
    text: &str,
) -> Option<EmbeddingRecord> {
    match oracle.embed(text).await {
        Ok(embedding) => {
            debug!("💻 Embedding stored for {} ({} dims)", kind, embedding.len());
            Some(EmbeddingRecord {
                kind,
                embedding,
                text: text.to_string(),
            })
        }
        Err(e) => {
            warn!("💻 Failed to generate embedding for {}: {}", kind, e);
            None
        }
    }
}
