#![allow(dead_code)]

use async_trait::async_trait;
use codex_bot::channels::HistoryMessage;
use codex_bot::{ChannelError, ChatTransport, Config, OracleError, Oracle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

type Responder = Box<dyn Fn(&str) -> Result<String, OracleError> + Send + Sync>;

/// Oracle that replays queued answers, then falls back to a responder
pub struct ScriptedOracle {
    answers: Mutex<VecDeque<Result<String, OracleError>>>,
    fallback: Responder,
    prompts: Mutex<Vec<String>>,
    embeds: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Result<String, OracleError>>,
    {
        Self::with_fallback(answers, |_| Err(OracleError::Request("script exhausted".into())))
    }

    pub fn with_fallback<I, F>(answers: I, fallback: F) -> Self
    where
        I: IntoIterator<Item = Result<String, OracleError>>,
        F: Fn(&str) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            fallback: Box::new(fallback),
            prompts: Mutex::new(Vec::new()),
            embeds: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn embed_calls(&self) -> usize {
        self.embeds.load(Ordering::SeqCst)
    }
}

pub fn ok(text: &str) -> Result<String, OracleError> {
    Ok(text.to_string())
}

pub fn down() -> Result<String, OracleError> {
    Err(OracleError::Request("connection refused".into()))
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn chat(&self, _system: &str, user: &str) -> Result<String, OracleError> {
        self.prompts.lock().push(user.to_string());
        let queued = self.answers.lock().pop_front();
        match queued {
            Some(answer) => answer,
            None => (self.fallback)(user),
        }
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, OracleError> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.25, 0.5, 0.75])
    }
}

/// Transport that records sends and serves canned history
pub struct RecordingTransport {
    self_id: String,
    max_len: usize,
    history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    history_fails: Mutex<bool>,
    sent: Mutex<Vec<(String, String)>>,
    /// Zero-based send attempts that should fail
    failing_sends: Mutex<HashSet<usize>>,
    attempts: AtomicUsize,
}

impl RecordingTransport {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            max_len: 2000,
            history: Mutex::new(HashMap::new()),
            history_fails: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
            failing_sends: Mutex::new(HashSet::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Newest-first history for a channel
    pub fn set_history(&self, channel_id: &str, newest_first: &[(&str, &str)]) {
        self.history.lock().insert(
            channel_id.to_string(),
            newest_first
                .iter()
                .map(|(author, content)| HistoryMessage {
                    author: author.to_string(),
                    content: content.to_string(),
                })
                .collect(),
        );
    }

    pub fn fail_history(&self, fail: bool) {
        *self.history_fails.lock() = fail;
    }

    pub fn fail_send_attempt(&self, attempt: usize) {
        self.failing_sends.lock().insert(attempt);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    fn self_id(&self) -> &str {
        &self.self_id
    }

    fn max_message_len(&self) -> usize {
        self.max_len
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, ChannelError> {
        if *self.history_fails.lock() {
            return Err(ChannelError::FetchFailed("history unavailable".into()));
        }
        Ok(self
            .history
            .lock()
            .get(channel_id)
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn send(&self, channel_id: &str, text: &str) -> Result<String, ChannelError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_sends.lock().contains(&attempt) {
            return Err(ChannelError::SendFailed("channel unavailable".into()));
        }
        self.sent.lock().push((channel_id.to_string(), text.to_string()));
        Ok(format!("msg-{}", attempt))
    }
}

/// Configuration with only the required token set, plus overrides
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.entry("DISCORD_BOT_TOKEN".into())
        .or_insert_with(|| "test-token".into());
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}
