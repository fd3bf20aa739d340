//! Per-Channel Message Debouncing
//!
//! Messages arriving in a channel are queued. A flush fires when no flush has
//! happened for that channel within the quiet window (measured from the last
//! triggered flush, so this throttles rather than trails). A flush drains the
//! whole queue in one critical section and records the flush time before any
//! async work starts.
//!
//! Guarantees:
//! - every queued message is flushed exactly once, in arrival order;
//! - at most one flush per channel is in flight at a time;
//! - with trailing flushes enabled, held messages are flushed when the window
//!   reopens even if no further message arrives.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// A message waiting to be flushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub author: String,
    pub content: String,
}

impl PendingMessage {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }
}

/// Transient per-channel state, never persisted
#[derive(Debug, Default)]
struct ChannelDebounceState {
    channel_name: String,
    pending: Vec<PendingMessage>,
    last_flush: Option<Instant>,
    in_flight: bool,
    trailing_scheduled: bool,
}

impl ChannelDebounceState {
    fn window_open(&self, now: Instant, window: Duration) -> bool {
        match self.last_flush {
            Some(last) => now.saturating_duration_since(last) >= window,
            None => true,
        }
    }
}

type ChannelMap = Arc<Mutex<HashMap<String, ChannelDebounceState>>>;

/// Marks a channel's flush as in flight until dropped
#[derive(Debug)]
pub struct FlushTicket {
    channels: ChannelMap,
    channel_id: String,
}

impl Drop for FlushTicket {
    fn drop(&mut self) {
        if let Some(state) = self.channels.lock().get_mut(&self.channel_id) {
            state.in_flight = false;
        }
    }
}

/// A drained batch of messages for one channel
#[derive(Debug)]
pub struct Flush {
    pub channel_id: String,
    pub channel_name: String,
    pub messages: Vec<PendingMessage>,
    _ticket: FlushTicket,
}

impl Flush {
    /// `author: content` per line, in arrival order
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.author, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outcome of offering a channel the chance to flush
#[derive(Debug)]
pub enum Admission {
    /// The queue was drained and must be processed
    Flush(Flush),
    /// Nothing flushed; `reopens_at` is when the window opens again, or
    /// `None` while a flush is still in flight
    Held {
        pending: usize,
        reopens_at: Option<Instant>,
    },
}

/// Registry of per-channel queues. All state transitions happen under one
/// synchronous lock that is never held across an await.
#[derive(Clone)]
pub struct DebounceRegistry {
    channels: ChannelMap,
    window: Duration,
}

impl DebounceRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Queue a message and flush the channel if its window is open
    pub fn push(
        &self,
        channel_id: &str,
        channel_name: &str,
        message: PendingMessage,
        now: Instant,
    ) -> Admission {
        let mut channels = self.channels.lock();
        let state = channels.entry(channel_id.to_string()).or_default();
        state.channel_name = channel_name.to_string();
        state.pending.push(message);

        self.admit(&mut channels, channel_id, now)
    }

    /// Flush the channel if it has pending messages and its window is open
    pub fn try_flush(&self, channel_id: &str, now: Instant) -> Admission {
        let mut channels = self.channels.lock();
        self.admit(&mut channels, channel_id, now)
    }

    fn admit(
        &self,
        channels: &mut HashMap<String, ChannelDebounceState>,
        channel_id: &str,
        now: Instant,
    ) -> Admission {
        let Some(state) = channels.get_mut(channel_id) else {
            return Admission::Held {
                pending: 0,
                reopens_at: None,
            };
        };

        if state.in_flight {
            return Admission::Held {
                pending: state.pending.len(),
                reopens_at: None,
            };
        }

        if state.pending.is_empty() || !state.window_open(now, self.window) {
            return Admission::Held {
                pending: state.pending.len(),
                reopens_at: state.last_flush.map(|last| last + self.window),
            };
        }

        // Drain, stamp and mark in flight as a single step
        let messages = std::mem::take(&mut state.pending);
        state.last_flush = Some(now);
        state.in_flight = true;

        Admission::Flush(Flush {
            channel_id: channel_id.to_string(),
            channel_name: state.channel_name.clone(),
            messages,
            _ticket: FlushTicket {
                channels: Arc::clone(&self.channels),
                channel_id: channel_id.to_string(),
            },
        })
    }

    /// Claim the trailing timer slot; false if one is already armed
    pub fn arm_trailing(&self, channel_id: &str) -> bool {
        let mut channels = self.channels.lock();
        match channels.get_mut(channel_id) {
            Some(state) if !state.trailing_scheduled => {
                state.trailing_scheduled = true;
                true
            }
            _ => false,
        }
    }

    pub fn disarm_trailing(&self, channel_id: &str) {
        if let Some(state) = self.channels.lock().get_mut(channel_id) {
            state.trailing_scheduled = false;
        }
    }

    pub fn pending_len(&self, channel_id: &str) -> usize {
        self.channels
            .lock()
            .get(channel_id)
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    pub fn is_in_flight(&self, channel_id: &str) -> bool {
        self.channels
            .lock()
            .get(channel_id)
            .map(|s| s.in_flight)
            .unwrap_or(false)
    }

    pub fn last_flush(&self, channel_id: &str) -> Option<Instant> {
        self.channels.lock().get(channel_id).and_then(|s| s.last_flush)
    }

    /// Number of channels seen so far
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}

/// Receives drained batches
#[async_trait]
pub trait FlushHandler: Send + Sync {
    /// Process a flush. The channel stays in flight until `flush` is dropped.
    async fn handle_flush(&self, flush: Flush);
}

/// Async driver around the registry: dispatches flushes to the handler and
/// runs the trailing timers.
pub struct ChannelDebouncer {
    registry: DebounceRegistry,
    handler: Arc<dyn FlushHandler>,
    trailing: bool,
}

impl ChannelDebouncer {
    pub fn new(window: Duration, trailing: bool, handler: Arc<dyn FlushHandler>) -> Arc<Self> {
        Arc::new(Self {
            registry: DebounceRegistry::new(window),
            handler,
            trailing,
        })
    }

    pub fn registry(&self) -> &DebounceRegistry {
        &self.registry
    }

    /// Queue an inbound message for its channel
    pub fn on_message(self: &Arc<Self>, channel_id: &str, channel_name: &str, message: PendingMessage) {
        let admission = self
            .registry
            .push(channel_id, channel_name, message, Instant::now());
        self.route(channel_id, admission);
    }

    fn attempt(self: &Arc<Self>, channel_id: &str) {
        let admission = self.registry.try_flush(channel_id, Instant::now());
        self.route(channel_id, admission);
    }

    fn route(self: &Arc<Self>, channel_id: &str, admission: Admission) {
        match admission {
            Admission::Flush(flush) => self.dispatch(flush),
            Admission::Held {
                pending,
                reopens_at: Some(at),
            } if pending > 0 && self.trailing => self.schedule_trailing(channel_id, at),
            Admission::Held { pending, .. } => {
                debug!("Channel {} holding {} message(s)", channel_id, pending);
            }
        }
    }

    fn dispatch(self: &Arc<Self>, flush: Flush) {
        info!(
            "💻 Flushing {} message(s) from channel {}",
            flush.messages.len(),
            flush.channel_id
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let channel_id = flush.channel_id.clone();
            this.handler.handle_flush(flush).await;

            // Anything that queued up while we were busy
            if this.trailing {
                this.attempt(&channel_id);
            }
        });
    }

    fn schedule_trailing(self: &Arc<Self>, channel_id: &str, at: Instant) {
        if !self.registry.arm_trailing(channel_id) {
            return;
        }

        debug!("Trailing flush armed for channel {}", channel_id);
        let this = Arc::clone(self);
        let channel_id = channel_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            this.registry.disarm_trailing(&channel_id);
            this.attempt(&channel_id);
        });
    }
}
