//! Sentiment collection
//!
//! The oracle reads a message and answers in emoji only. Every emoji sequence
//! in the answer is appended to the author's sentiment ledger.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{error, info};

use crate::memory::SharedMemory;
use crate::oracle::Oracle;

/// One pictographic char with optional VS16 / skin tone, plus ZWJ continuations
static EMOJI_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\p{Extended_Pictographic}[\x{FE0F}\x{1F3FB}-\x{1F3FF}]*(?:\x{200D}\p{Extended_Pictographic}[\x{FE0F}\x{1F3FB}-\x{1F3FF}]*)*",
    )
    .expect("emoji pattern is valid")
});

/// All emoji sequences in `text`, in order
pub fn extract_emoji(text: &str) -> Vec<String> {
    EMOJI_SEQUENCE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub struct SentimentCollector {
    oracle: Arc<dyn Oracle>,
    agent_name: String,
    personality: String,
}

impl SentimentCollector {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        agent_name: impl Into<String>,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            agent_name: agent_name.into(),
            personality: personality.into(),
        }
    }

    fn prompt(&self, text: &str) -> String {
        format!(
            "As {}, I have received the following message: \"{}\".\n\
             Considering my recent memories, current goal, and overall context, \
             how should I interpret the sentiment of this message?\n\
             Only respond with a series of emojis to represent the sentiment.",
            self.agent_name, text
        )
    }

    /// Emoji tokens the oracle associates with `text`. Empty on failure.
    pub async fn extract(&self, text: &str) -> Vec<String> {
        match self.oracle.chat(&self.personality, &self.prompt(text)).await {
            Ok(answer) => {
                info!("💻 Sentiment Analysis Result: {}", answer);
                extract_emoji(&answer)
            }
            Err(e) => {
                error!("💻 Failed to extract sentiment: {}", e);
                Vec::new()
            }
        }
    }

    /// Append the author's sentiment for `text` and persist. Returns how many
    /// tokens were added; nothing is written when there are none.
    pub async fn collect(&self, memory: &SharedMemory, author: &str, text: &str) -> usize {
        let tokens = self.extract(text).await;
        if tokens.is_empty() {
            return 0;
        }

        let added = memory
            .update(|m| m.append_sentiments(author, tokens))
            .await;
        memory.persist().await;
        added
    }
}
