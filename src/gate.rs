//! Response gate
//!
//! Two oracle calls decide whether the agent answers a transcript: a yes/no
//! question, then (only on an affirmative) the reply itself.

use std::sync::Arc;
use tracing::{error, info};

use crate::oracle::Oracle;

/// Result of classifying the oracle's yes/no answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Respond,
    Decline,
}

/// Case-insensitive substring match on "yes". Anything containing it counts,
/// including words like "yesterday".
pub fn classify_affirmation(answer: &str) -> GateDecision {
    if answer.to_lowercase().contains("yes") {
        GateDecision::Respond
    } else {
        GateDecision::Decline
    }
}

pub struct ResponseGate {
    oracle: Arc<dyn Oracle>,
    agent_name: String,
    personality: String,
}

impl ResponseGate {
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

    pub fn decision_prompt(&self, transcript: &str) -> String {
        format!(
            "{}\n\nWould {} like to respond to this message? answer with YES or NO, \
             if your response contains the word YES you will be prompted to respond to the message.",
            transcript,
            self.agent_name.to_lowercase()
        )
    }

    pub fn reply_prompt(&self, transcript: &str) -> String {
        format!("You are {}\n\n{}", self.agent_name, transcript)
    }

    /// Decide whether to answer `transcript`, returning the reply if so.
    /// Oracle failures and blank replies both yield `None`.
    pub async fn decide(&self, transcript: &str) -> Option<String> {
        let answer = match self
            .oracle
            .chat(&self.personality, &self.decision_prompt(transcript))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                error!("💻 Failed to get response decision: {}", e);
                return None;
            }
        };

        if classify_affirmation(&answer) == GateDecision::Decline {
            info!("💻 {} decided not to respond to the message", self.agent_name);
            info!("{}", answer);
            return None;
        }

        info!("💻 {} decided to respond to the message", self.agent_name);
        let reply = match self
            .oracle
            .chat(&self.personality, &self.reply_prompt(transcript))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("💻 Failed to generate response: {}", e);
                return None;
            }
        };

        if reply.trim().is_empty() {
            error!("💻 {} has no response", self.agent_name);
            return None;
        }

        info!("💻 {} responds: {}", self.agent_name, reply);
        Some(reply)
    }
}
