//! Discord Channel Implementation
//!
//! Talks to the Discord REST API directly. Login is `GET /users/@me`;
//! inbound messages are picked up by polling each configured channel with an
//! `after=` cursor that starts at the channel's newest message, so history
//! from before startup is never replayed. A channel whose newest message
//! could not be read stays silent until a later lookup succeeds. A 429 pauses
//! polling of that channel for the advertised `retry_after`.

use super::traits::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const DISCORD_API: &str = "https://discord.com/api/v10";

/// Floor for the poll period; `interval` rejects zero
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Discord channel configuration
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Bot token
    pub bot_token: String,
    /// Channels polled for inbound messages
    pub channel_ids: Vec<String>,
    /// Delay between polls
    pub poll_interval: Duration,
    /// Maximum message length (Discord limit: 2000)
    pub max_message_length: usize,
    /// REST base URL
    pub api_base: String,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>, channel_ids: Vec<String>, poll_interval: Duration) -> Self {
        Self {
            bot_token: bot_token.into(),
            channel_ids,
            poll_interval,
            max_message_length: 2000,
            api_base: DISCORD_API.to_string(),
        }
    }
}

/// Discord transport, only constructible through a successful login
pub struct DiscordTransport {
    config: DiscordConfig,
    client: reqwest::Client,
    user: DiscordUser,
    /// Channel ID -> name
    channel_names: RwLock<HashMap<String, String>>,
}

impl DiscordTransport {
    /// Verify the bot token and learn the bot's own identity
    pub async fn connect(config: DiscordConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChannelError::Internal(e.to_string()))?;

        let response = client
            .get(format!("{}/users/@me", config.api_base))
            .header("Authorization", format!("Bot {}", config.bot_token))
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChannelError::AuthenticationFailed(format!(
                "Discord rejected the bot token ({})",
                response.status()
            )));
        }

        let user: DiscordUser = response
            .json()
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))?;

        info!("💻 Online as {} ({})", user.username, user.id);

        Ok(Self {
            config,
            client,
            user,
            channel_names: RwLock::new(HashMap::new()),
        })
    }

    pub fn user(&self) -> &DiscordUser {
        &self.user
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.config.api_base, path))
            .header("Authorization", format!("Bot {}", self.config.bot_token))
    }

    /// Channel name, looked up once and cached. Falls back to the ID.
    pub async fn channel_name(&self, channel_id: &str) -> String {
        if let Some(name) = self.channel_names.read().await.get(channel_id) {
            return name.clone();
        }

        let name = match self.fetch_channel(channel_id).await {
            Ok(channel) => channel.name.unwrap_or_else(|| channel_id.to_string()),
            Err(e) => {
                warn!("Failed to resolve Discord channel {}: {}", channel_id, e);
                return channel_id.to_string();
            }
        };

        self.channel_names
            .write()
            .await
            .insert(channel_id.to_string(), name.clone());
        name
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<DiscordChannelInfo, ChannelError> {
        let response = self
            .get(&format!("/channels/{}", channel_id))
            .send()
            .await
            .map_err(|e| ChannelError::FetchFailed(e.to_string()))?;

        read_json(response).await
    }

    /// Raw messages, newest first
    async fn fetch_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscordMessageEvent>, ChannelError> {
        let mut query = vec![("limit", limit.clamp(1, 100).to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .get(&format!("/channels/{}/messages", channel_id))
            .query(&query)
            .send()
            .await
            .map_err(|e| ChannelError::FetchFailed(e.to_string()))?;

        read_json(response).await
    }

    /// Newest message ID in the channel, `Empty` if there is none yet
    async fn resolve_cursor(&self, channel_id: &str) -> Result<Cursor, ChannelError> {
        let newest = self.fetch_messages(channel_id, None, 1).await?;
        Ok(match newest.first() {
            Some(message) => Cursor::After(message.id.clone()),
            None => Cursor::Empty,
        })
    }

    /// One poll of one channel. New messages come back oldest first. An
    /// unresolved channel only learns its cursor and yields nothing.
    async fn poll_channel(&self, poll: &mut ChannelPoll) -> Result<Vec<DiscordMessageEvent>, ChannelError> {
        if poll.cursor == Cursor::Unresolved {
            poll.cursor = self.resolve_cursor(&poll.channel_id).await?;
            debug!("Discord channel {} resolved to {:?}", poll.channel_id, poll.cursor);
            return Ok(Vec::new());
        }

        let after = match &poll.cursor {
            Cursor::After(id) => Some(id.clone()),
            _ => None,
        };

        let batch = self
            .fetch_messages(&poll.channel_id, after.as_deref(), 100)
            .await?;
        Ok(poll.accept(batch))
    }

    /// Poll the configured channels and forward new messages to `tx` until
    /// shutdown is signalled or the receiver goes away.
    pub fn spawn_poller(
        self: Arc<Self>,
        tx: mpsc::Sender<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut polls: Vec<ChannelPoll> = Vec::with_capacity(self.config.channel_ids.len());
            for channel_id in &self.config.channel_ids {
                let mut poll = ChannelPoll::new(channel_id.clone());
                match self.resolve_cursor(channel_id).await {
                    Ok(cursor) => poll.cursor = cursor,
                    Err(e) => {
                        warn!("Failed to read Discord channel {}, will retry: {}", channel_id, e);
                        if let ChannelError::RateLimited(secs) = e {
                            poll.pause(Duration::from_secs(secs));
                        }
                    }
                }
                polls.push(poll);
            }

            let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);
            info!("💻 Polling {} Discord channel(s) every {:?}", polls.len(), period);

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                for poll in polls.iter_mut() {
                    if !poll.is_ready(Instant::now()) {
                        continue;
                    }

                    let batch = match self.poll_channel(poll).await {
                        Ok(batch) => batch,
                        Err(ChannelError::RateLimited(secs)) => {
                            warn!("Discord rate limit on {}, pausing {}s", poll.channel_id, secs);
                            poll.pause(Duration::from_secs(secs));
                            continue;
                        }
                        Err(e) => {
                            debug!("Poll of {} failed: {}", poll.channel_id, e);
                            continue;
                        }
                    };
                    if batch.is_empty() {
                        continue;
                    }

                    let channel_name = self.channel_name(&poll.channel_id).await;
                    for event in &batch {
                        let inbound = inbound_from_event(event, &self.user.id, &channel_name);
                        if tx.send(inbound).await.is_err() {
                            info!("Inbound receiver closed, stopping Discord poller");
                            return;
                        }
                    }
                }
            }

            info!("Discord poller stopped");
        })
    }
}

/// Where polling of one channel resumes
#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    /// Newest message unknown; nothing is forwarded until it is learned
    Unresolved,
    /// The channel had no messages when its cursor was resolved
    Empty,
    After(String),
}

/// Per-channel polling state
#[derive(Debug)]
struct ChannelPoll {
    channel_id: String,
    cursor: Cursor,
    paused_until: Option<Instant>,
}

impl ChannelPoll {
    fn new(channel_id: String) -> Self {
        Self {
            channel_id,
            cursor: Cursor::Unresolved,
            paused_until: None,
        }
    }

    fn pause(&mut self, wait: Duration) {
        self.paused_until = Some(Instant::now() + wait);
    }

    fn is_ready(&mut self, now: Instant) -> bool {
        match self.paused_until {
            Some(until) if now < until => false,
            _ => {
                self.paused_until = None;
                true
            }
        }
    }

    /// Take a newest-first batch, advance the cursor past it and return it
    /// oldest first
    fn accept(&mut self, mut batch: Vec<DiscordMessageEvent>) -> Vec<DiscordMessageEvent> {
        batch.reverse();
        if let Some(last) = batch.last() {
            self.cursor = Cursor::After(last.id.clone());
        }
        batch
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    fn name(&self) -> &str {
        "discord"
    }

    fn self_id(&self) -> &str {
        &self.user.id
    }

    fn max_message_len(&self) -> usize {
        self.config.max_message_length
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, ChannelError> {
        let messages = self.fetch_messages(channel_id, None, limit).await?;
        Ok(messages
            .iter()
            .map(|m| HistoryMessage {
                author: m.author.display_name().to_string(),
                content: m.content.clone(),
            })
            .collect())
    }

    async fn send(&self, channel_id: &str, text: &str) -> Result<String, ChannelError> {
        let url = format!("{}/channels/{}/messages", self.config.api_base, channel_id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.config.bot_token))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        let result: DiscordMessageResponse = read_json(response).await.map_err(|e| match e {
            ChannelError::FetchFailed(msg) => ChannelError::SendFailed(msg),
            other => other,
        })?;
        Ok(result.id)
    }
}

async fn read_json<T>(response: reqwest::Response) -> Result<T, ChannelError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 429 {
        error!("💻 Discord rate limited: {}", body);
        Err(ChannelError::RateLimited(retry_after_secs(&body)))
    } else {
        Err(ChannelError::FetchFailed(format!(
            "Discord error {}: {}",
            status, body
        )))
    }
}

/// Seconds to wait from a 429 body, rounded up; 5 when absent
fn retry_after_secs(body: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("retry_after").and_then(|r| r.as_f64()))
        .map(|secs| secs.ceil().max(0.0) as u64)
        .unwrap_or(5)
}

/// Map a Discord message to the transport-neutral form
pub fn inbound_from_event(event: &DiscordMessageEvent, self_id: &str, channel_name: &str) -> InboundMessage {
    InboundMessage {
        id: event.id.clone(),
        author_id: event.author.id.clone(),
        author_display_name: event.author.display_name().to_string(),
        content: event.content.clone(),
        channel_id: event.channel_id.clone(),
        channel_name: channel_name.to_string(),
        mentions_self: event.mentions.iter().any(|u| u.id == self_id),
    }
}

/// Discord message object
#[derive(Debug, Deserialize, Serialize)]
pub struct DiscordMessageEvent {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl DiscordUser {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Deserialize)]
struct DiscordChannelInfo {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordMessageResponse {
    id: String,
}
