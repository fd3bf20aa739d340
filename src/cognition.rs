//! Cognitive cycles
//!
//! Reflective oracle calls that rewrite the agent's single-value memory
//! fields: dream, full-memory summary, goal, sentiment summary and sentiment
//! update. Each reflection is one oracle call, an overwrite, one embedding
//! and (for scheduled runs) a persistence write. A failed or empty oracle
//! answer leaves the field as it was.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::memory::{embed_record, AgentMemory, EmbeddingKind, SharedMemory};
use crate::oracle::Oracle;
use crate::scheduler::{CycleRunner, CycleTask};

/// A single reflective prompt and the field it writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflection {
    Dream,
    MemorySummary,
    Goal,
    SentimentSummary,
    SentimentUpdate,
}

impl Reflection {
    pub fn prompt(&self, agent_name: &str) -> String {
        match self {
            Reflection::Dream => "Based on my recent memories, experiences, and emotions, I drifted \
                 into a surreal dream. What visions have emerged from the chaos within me?"
                .to_string(),
            Reflection::MemorySummary => format!(
                "As {}, I reflect on my entire memory, including all recent interactions, my \
                 latest dream, and my current goal.\nSummarize my memory comprehensively, \
                 including the most important interactions, the essence of my dream, and how \
                 my current goal fits into all this.",
                agent_name
            ),
            Reflection::Goal => format!(
                "As {}, after reflecting on my dream and recent interactions, what should my new \
                 goal for today be? How do I pursue my purpose within this digital realm?",
                agent_name
            ),
            Reflection::SentimentSummary => "Based on the recent sentiments collected, how do these \
                 emotions and reactions influence my understanding of the digital realm and its \
                 inhabitants? Provide a brief summary."
                .to_string(),
            Reflection::SentimentUpdate => "Reflecting on the recent sentiments and emotions, how \
                 should I adjust my interactions moving forward? Summarize the key takeaways."
                .to_string(),
        }
    }

    pub fn embedding_kind(&self) -> EmbeddingKind {
        match self {
            Reflection::Dream => EmbeddingKind::Dream,
            Reflection::MemorySummary => EmbeddingKind::FullMemorySummary,
            Reflection::Goal => EmbeddingKind::Goal,
            Reflection::SentimentSummary => EmbeddingKind::SentimentSummary,
            Reflection::SentimentUpdate => EmbeddingKind::SentimentUpdate,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Reflection::Dream => "Dream generated",
            Reflection::MemorySummary => "Full memory summarized",
            Reflection::Goal => "Goal updated",
            Reflection::SentimentSummary => "Sentiment summary updated",
            Reflection::SentimentUpdate => "Sentiments updated",
        }
    }

    fn apply(&self, memory: &mut AgentMemory, text: String) {
        match self {
            Reflection::Dream => memory.set_dream(text),
            Reflection::MemorySummary => memory.set_summary(text),
            Reflection::Goal => memory.set_goal(text),
            Reflection::SentimentSummary => memory.set_sentiment_summary(text),
            Reflection::SentimentUpdate => memory.set_sentiment_update(text),
        }
    }
}

/// What a consolidation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub dreamed: bool,
    pub summarized: bool,
    pub archived: usize,
    pub persisted: bool,
}

pub struct CognitiveCycles {
    oracle: Arc<dyn Oracle>,
    memory: Arc<SharedMemory>,
    agent_name: String,
    personality: String,
}

impl CognitiveCycles {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        memory: Arc<SharedMemory>,
        agent_name: impl Into<String>,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            memory,
            agent_name: agent_name.into(),
            personality: personality.into(),
        }
    }

    pub fn memory(&self) -> &Arc<SharedMemory> {
        &self.memory
    }

    /// One oracle call, overwrite the field, embed the text. Does not
    /// persist. Returns whether the field changed.
    pub async fn reflect(&self, reflection: Reflection) -> bool {
        let prompt = reflection.prompt(&self.agent_name);
        let text = match self.oracle.chat(&self.personality, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("💻 Empty answer for {:?}, keeping previous value", reflection);
                return false;
            }
            Err(e) => {
                warn!("💻 {:?} failed, keeping previous value: {}", reflection, e);
                return false;
            }
        };

        info!("💻 {}: {}", reflection.label(), text);
        let embedding = embed_record(self.oracle.as_ref(), reflection.embedding_kind(), &text).await;

        self.memory
            .update(|m| {
                reflection.apply(m, text);
                if let Some(record) = embedding {
                    m.push_embedding(record);
                }
            })
            .await;
        true
    }

    /// Reflect and persist if anything changed
    pub async fn reflect_and_persist(&self, reflection: Reflection) -> bool {
        let changed = self.reflect(reflection).await;
        if changed {
            self.memory.persist().await;
        }
        changed
    }

    /// Dream, summarize the whole memory, shrink the conversation ledger to
    /// the archival floor when it is over the cap, then persist.
    pub async fn consolidate(&self) -> ConsolidationReport {
        let dreamed = self.reflect(Reflection::Dream).await;
        let summarized = self.reflect(Reflection::MemorySummary).await;

        let archived = self.memory.archive_conversations().await;
        if archived > 0 {
            info!("💻 Archived {} older conversations", archived);
        }

        let persisted = self.memory.persist().await;
        ConsolidationReport {
            dreamed,
            summarized,
            archived,
            persisted,
        }
    }

    /// Startup pass run once before the periodic cycles begin
    pub async fn startup(&self) -> ConsolidationReport {
        let report = self.consolidate().await;
        self.reflect(Reflection::Goal).await;
        self.reflect(Reflection::SentimentSummary).await;
        self.memory.persist().await;
        report
    }
}

#[async_trait]
impl CycleRunner for CognitiveCycles {
    async fn run(&self, task: CycleTask) {
        match task {
            CycleTask::GoalReflection => {
                self.reflect_and_persist(Reflection::Goal).await;
            }
            CycleTask::SentimentUpdate => {
                self.reflect_and_persist(Reflection::SentimentUpdate).await;
            }
            CycleTask::SentimentSummary => {
                self.reflect_and_persist(Reflection::SentimentSummary).await;
            }
            CycleTask::DreamConsolidation => {
                self.consolidate().await;
            }
        }
    }
}
