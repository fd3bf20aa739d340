//! Shared memory handle
//!
//! The one in-process `AgentMemory` instance, together with the store that
//! makes it durable. Message handling and cognitive cycles all go through
//! this handle. Single-value fields are last-write-wins; persisting always
//! writes a snapshot at least as new as the previous write.

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

use super::{AgentMemory, ConversationRecord, EmbeddingRecord, Exchange};
use crate::config::MemoryLimits;
use crate::store::MemoryStore;

pub struct SharedMemory {
    memory: RwLock<AgentMemory>,
    store: MemoryStore,
    limits: MemoryLimits,
    /// Serializes snapshot + write so saves land in order
    persist_lock: Mutex<()>,
}

impl SharedMemory {
    /// Wrap an already loaded memory
    pub fn new(memory: AgentMemory, store: MemoryStore, limits: MemoryLimits) -> Self {
        Self {
            memory: RwLock::new(memory),
            store,
            limits,
            persist_lock: Mutex::new(()),
        }
    }

    /// Load-or-create from the store
    pub async fn load(store: MemoryStore, limits: MemoryLimits) -> Self {
        let memory = store.load_or_default().await;
        Self::new(memory, store, limits)
    }

    pub fn limits(&self) -> MemoryLimits {
        self.limits
    }

    pub fn agent_id(&self) -> &str {
        self.store.agent_id()
    }

    /// Read from the memory without cloning it
    pub async fn read<R>(&self, f: impl FnOnce(&AgentMemory) -> R) -> R {
        let memory = self.memory.read().await;
        f(&memory)
    }

    /// Mutate the memory in place. Does not persist.
    pub async fn update<R>(&self, f: impl FnOnce(&mut AgentMemory) -> R) -> R {
        let mut memory = self.memory.write().await;
        f(&mut memory)
    }

    /// Clone of the current memory
    pub async fn snapshot(&self) -> AgentMemory {
        self.memory.read().await.clone()
    }

    /// Write the current memory to the store. Failures are logged; the
    /// in-memory state stays authoritative until a later save succeeds.
    pub async fn persist(&self) -> bool {
        let _ordered = self.persist_lock.lock().await;
        let snapshot = self.snapshot().await;

        match self.store.save(&snapshot).await {
            Ok(()) => true,
            Err(e) => {
                error!("💻 Failed to save memory for {}: {}", self.agent_id(), e);
                false
            }
        }
    }

    /// Append an exchange (trimmed to the cap) and persist it
    pub async fn record_exchange(&self, exchange: &Exchange, response: &str) -> ConversationRecord {
        let limits = self.limits;
        let record = self
            .update(|m| m.record_exchange(exchange, response, limits))
            .await;
        debug!("💻 Updating memory with conversation in {}", record.location);

        self.persist().await;
        record
    }

    /// Append an embedding to the archive (not persisted on its own)
    pub async fn push_embedding(&self, record: EmbeddingRecord) {
        self.update(|m| m.push_embedding(record)).await;
    }

    /// Apply the archival rule; returns how many conversations were dropped
    pub async fn archive_conversations(&self) -> usize {
        let limits = self.limits;
        self.update(|m| m.archive_conversations(limits)).await
    }
}
