//! Codex Bot
//!
//! A chat agent that listens on Discord, decides for itself when to answer,
//! and keeps an evolving memory shaped by periodic reflection.
//!
//! # Architecture
//!
//! ```text
//! Discord ──► Poller ──► AgentRuntime ──┬── mention ──────────┐
//!                                       └── ChannelDebouncer ─┤
//!                                                             ▼
//!                            ResponseGate (Ollama) ──► reply ──► Discord
//!                                                             │
//!                                   SharedMemory ◄── record ──┘
//!                                        ▲    └──► MemoryStore (SQLite)
//!                                        │
//!                      CognitiveCycleScheduler (goal, sentiment, dream)
//! ```

pub mod agent;
pub mod channels;
pub mod cognition;
pub mod config;
pub mod debounce;
pub mod gate;
pub mod memory;
pub mod oracle;
pub mod runtime;
pub mod scheduler;
pub mod sentiment;
pub mod store;

pub use agent::{Agent, AgentSettings, StateReport};
pub use channels::{ChannelError, ChatTransport, DiscordConfig, DiscordTransport, InboundMessage};
pub use cognition::{CognitiveCycles, ConsolidationReport, Reflection};
pub use config::{Config, ConfigError, MemoryLimits, TimingConfig};
pub use debounce::{ChannelDebouncer, DebounceRegistry, Flush, FlushHandler, PendingMessage};
pub use gate::{classify_affirmation, GateDecision, ResponseGate};
pub use memory::{AgentMemory, SharedMemory};
pub use oracle::{OllamaConfig, OllamaOracle, Oracle, OracleError};
pub use runtime::{AgentRuntime, Routing};
pub use scheduler::{CognitiveCycleScheduler, CycleRunner, CycleTask};
pub use sentiment::{extract_emoji, SentimentCollector};
pub use store::{InMemoryBackend, MemoryBackend, MemoryStore, SqliteBackend, StoreError};
