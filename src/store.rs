//! Memory Store
//!
//! Persists the agent's memory as one JSON document keyed by agent name.
//! Backends only need whole-document get and upsert; the store adds the
//! typed (de)serialization and load-or-create behavior.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::memory::AgentMemory;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Whole-document persistence driver
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Fetch the memory document for an agent, if any
    async fn get(&self, agent_id: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Create or fully replace the memory document for an agent
    async fn put(&self, agent_id: &str, memory: serde_json::Value) -> Result<(), StoreError>;
}

/// SQLite backend, one row per agent
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open or create the memory database
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let backend = Self::with_connection(conn)?;

        info!("Memory store opened: {}", path.display());
        Ok(backend)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                name TEXT PRIMARY KEY,
                memory TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (unixepoch())
            );
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {}", e)))?
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    async fn get(&self, agent_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let agent_id = agent_id.to_string();
        let raw: Option<String> = self
            .blocking(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT memory FROM memories WHERE name = ?1",
                        params![agent_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;

        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn put(&self, agent_id: &str, memory: serde_json::Value) -> Result<(), StoreError> {
        let agent_id = agent_id.to_string();
        let raw = serde_json::to_string(&memory)?;
        self.blocking(move |conn| {
            conn.execute(
                r#"
                INSERT INTO memories (name, memory, updated_at)
                VALUES (?1, ?2, unixepoch())
                ON CONFLICT(name) DO UPDATE SET
                    memory = excluded.memory,
                    updated_at = excluded.updated_at
                "#,
                params![agent_id, raw],
            )?;
            Ok(())
        })
        .await
    }
}

/// Process-local backend. Useful for ephemeral runs and tests; can be told
/// to fail so persistence-failure paths are observable.
#[derive(Default)]
pub struct InMemoryBackend {
    records: Mutex<HashMap<String, serde_json::Value>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent get/put fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw stored document for an agent
    pub fn document(&self, agent_id: &str) -> Option<serde_json::Value> {
        self.records.lock().get(agent_id).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Backend("backend unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn get(&self, agent_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.check()?;
        Ok(self.records.lock().get(agent_id).cloned())
    }

    async fn put(&self, agent_id: &str, memory: serde_json::Value) -> Result<(), StoreError> {
        self.check()?;
        self.records.lock().insert(agent_id.to_string(), memory);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Typed access to one agent's memory document
#[derive(Clone)]
pub struct MemoryStore {
    backend: Arc<dyn MemoryBackend>,
    agent_id: String,
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn MemoryBackend>, agent_id: impl Into<String>) -> Self {
        Self {
            backend,
            agent_id: agent_id.into(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Load the stored memory, `None` when the agent has none yet
    pub async fn load(&self) -> Result<Option<AgentMemory>, StoreError> {
        match self.backend.get(&self.agent_id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Load-or-create. Any failure falls back to a fresh memory.
    pub async fn load_or_default(&self) -> AgentMemory {
        match self.load().await {
            Ok(Some(memory)) => {
                info!(
                    "💻 Memory loaded for {} ({} conversations, {} embeddings)",
                    self.agent_id,
                    memory.conversations().len(),
                    memory.embeddings().len()
                );
                memory
            }
            Ok(None) => {
                info!(
                    "💻 No existing memory found for {}. Starting with fresh memory.",
                    self.agent_id
                );
                AgentMemory::default()
            }
            Err(e) => {
                error!("💻 Failed to load memory for {}: {}", self.agent_id, e);
                AgentMemory::default()
            }
        }
    }

    /// Upsert the whole memory document
    pub async fn save(&self, memory: &AgentMemory) -> Result<(), StoreError> {
        let value = serde_json::to_value(memory)?;
        self.backend.put(&self.agent_id, value).await?;
        debug!(
            "💻 Memory saved for {} ({} conversations)",
            self.agent_id,
            memory.conversations().len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryLimits;
    use crate::memory::Exchange;

    #[tokio::test]
    async fn test_missing_record_loads_default() {
        let store = MemoryStore::new(Arc::new(InMemoryBackend::new()), "Codex");
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(store.load_or_default().await, AgentMemory::default());
    }

    #[tokio::test]
    async fn test_failing_backend_loads_default() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.set_failing(true);
        let store = MemoryStore::new(backend, "Codex");

        assert!(store.load().await.is_err());
        assert_eq!(store.load_or_default().await, AgentMemory::default());
    }

    #[tokio::test]
    async fn test_sqlite_upsert_replaces_document() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = MemoryStore::new(backend, "Codex");

        let mut memory = AgentMemory::default();
        memory.set_goal("first");
        store.save(&memory).await.unwrap();

        memory.set_goal("second");
        memory.record_exchange(&Exchange::new("general", "hi"), "hello", MemoryLimits::default());
        store.save(&memory).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.goal(), "second");
        assert_eq!(loaded, memory);
    }

    #[tokio::test]
    async fn test_agents_are_isolated() {
        let backend: Arc<dyn MemoryBackend> = Arc::new(InMemoryBackend::new());
        let codex = MemoryStore::new(Arc::clone(&backend), "Codex");
        let other = MemoryStore::new(backend, "Other");

        let mut memory = AgentMemory::default();
        memory.set_dream("electric sheep");
        codex.save(&memory).await.unwrap();

        assert!(other.load().await.unwrap().is_none());
        assert_eq!(codex.load().await.unwrap().unwrap().dream(), "electric sheep");
    }
}
