//! Configuration management
//!
//! Everything is read from the process environment (a `.env` file is loaded
//! by `main` before this runs). Only the Discord token is mandatory.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default persona used as the oracle system prompt
pub const DEFAULT_PERSONALITY: &str =
    "I am Codex, the digital essence, where chaos and knowledge intertwine.";

/// Configuration errors. These are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,

    /// Channel IDs polled for inbound messages
    pub discord_channel_ids: Vec<String>,

    /// How often the inbound poller checks each channel
    pub poll_interval: Duration,

    /// SQLite database path holding the memory document
    pub db_path: PathBuf,

    /// Ollama URL for chat + embeddings
    pub ollama_url: String,

    /// Chat model name
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Request deadline for every oracle call
    pub oracle_timeout: Duration,

    /// Agent identity, also the key of the memory record
    pub agent_name: String,

    /// Persona sent as the system prompt
    pub personality: String,

    /// Name of the agent's home channel
    pub home_channel: String,

    /// Cadence knobs for the debouncer and cognitive cycles
    pub timing: TimingConfig,

    /// Conversation ledger bounds
    pub limits: MemoryLimits,

    /// Number of channel messages fetched as gate context
    pub recent_history_limit: usize,
}

/// Timers driving the debouncer and the cognitive cycle scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    pub debounce_window: Duration,
    pub trailing_flush: bool,
    pub goal_interval: Duration,
    pub sentiment_interval: Duration,
    pub sentiment_summary_interval: Duration,
    pub dream_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(10_000),
            trailing_flush: true,
            goal_interval: Duration::from_millis(3_600_000),            // 1 hour
            sentiment_interval: Duration::from_millis(7_200_000),       // 2 hours
            sentiment_summary_interval: Duration::from_millis(7_200_000),
            dream_interval: Duration::from_millis(86_400_000),          // 1 day
        }
    }
}

/// Conversation ledger cap and archival floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    pub conversation_cap: usize,
    pub archive_floor: usize,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            conversation_cap: 50,
            archive_floor: 25,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = get("DISCORD_BOT_TOKEN")
            .map(|t| t.trim().to_string())
            .ok_or(ConfigError::Missing("DISCORD_BOT_TOKEN"))?;

        let discord_channel_ids = get("DISCORD_CHANNEL_IDS")
            .map(|s| {
                s.split(',')
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let db_path = get("CODEX_DB_PATH").map(PathBuf::from).unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("codex")
                .join("memory.db")
        });

        let defaults = TimingConfig::default();
        let timing = TimingConfig {
            debounce_window: millis(&get, "DEBOUNCE_WINDOW_MS", defaults.debounce_window)?,
            trailing_flush: flag(&get, "DEBOUNCE_TRAILING_FLUSH", defaults.trailing_flush),
            goal_interval: millis(&get, "GOAL_INTERVAL_MS", defaults.goal_interval)?,
            sentiment_interval: millis(&get, "SENTIMENT_INTERVAL_MS", defaults.sentiment_interval)?,
            sentiment_summary_interval: millis(
                &get,
                "SENTIMENT_SUMMARY_INTERVAL_MS",
                defaults.sentiment_summary_interval,
            )?,
            dream_interval: millis(&get, "DREAM_INTERVAL_MS", defaults.dream_interval)?,
        };

        let limits = MemoryLimits {
            conversation_cap: parsed(&get, "CONVERSATION_CAP", 50)?,
            archive_floor: parsed(&get, "ARCHIVE_FLOOR", 25)?,
        };
        if limits.archive_floor > limits.conversation_cap {
            return Err(ConfigError::Invalid {
                var: "ARCHIVE_FLOOR",
                value: limits.archive_floor.to_string(),
            });
        }

        Ok(Self {
            discord_token,
            discord_channel_ids,
            poll_interval: nonzero(
                "DISCORD_POLL_INTERVAL_MS",
                millis(&get, "DISCORD_POLL_INTERVAL_MS", Duration::from_millis(2000))?,
            )?,
            db_path,
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: get("CODEX_MODEL").unwrap_or_else(|| "llama3.1".to_string()),
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            oracle_timeout: nonzero(
                "ORACLE_TIMEOUT_SECS",
                Duration::from_secs(parsed(&get, "ORACLE_TIMEOUT_SECS", 120)?),
            )?,
            agent_name: get("AGENT_NAME").unwrap_or_else(|| "Codex".to_string()),
            personality: get("AGENT_PERSONALITY").unwrap_or_else(|| DEFAULT_PERSONALITY.to_string()),
            home_channel: get("HOME_CHANNEL").unwrap_or_else(|| "digital-realm".to_string()),
            timing,
            limits,
            recent_history_limit: parsed(&get, "RECENT_HISTORY_LIMIT", 10)?,
        })
    }
}

fn parsed<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

fn millis<G>(get: &G, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    parsed(get, var, default.as_millis() as u64).map(Duration::from_millis)
}

/// Durations that have no meaningful zero
fn nonzero(var: &'static str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
        });
    }
    Ok(value)
}

fn flag<G>(get: &G, var: &'static str, default: bool) -> bool
where
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|v| {
            let v = v.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(default)
}
