use codex_bot::memory::{EmbeddingKind, EmbeddingRecord, Exchange};
use codex_bot::{AgentMemory, MemoryLimits, MemoryStore, SharedMemory, SqliteBackend};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn open(dir: &TempDir) -> MemoryStore {
    let backend = SqliteBackend::open(&dir.path().join("nested").join("memory.db")).unwrap();
    MemoryStore::new(Arc::new(backend), "Codex")
}

#[tokio::test]
async fn test_memory_survives_restart() {
    let dir = TempDir::new().unwrap();

    let before = {
        let memory = SharedMemory::load(open(&dir), MemoryLimits::default()).await;
        memory
            .record_exchange(&Exchange::new("general", "alice: hello"), "Greetings, traveler.")
            .await;
        memory
            .update(|m| {
                m.set_goal("learn the names of everyone here");
                m.append_sentiments("alice", vec!["🙂".to_string(), "🎉".to_string()]);
                m.push_embedding(EmbeddingRecord {
                    kind: EmbeddingKind::Goal,
                    embedding: vec![0.1, 0.2, 0.3],
                    text: "learn the names of everyone here".into(),
                });
            })
            .await;
        assert!(memory.persist().await);
        memory.snapshot().await
    };

    // Fresh connection to the same file
    let loaded = assert_ok!(open(&dir).load().await).unwrap();
    assert_eq!(loaded, before);
    assert_eq!(loaded.conversations().len(), 1);
    assert_eq!(loaded.conversations().records()[0].response, "Greetings, traveler.");
    assert_eq!(loaded.sentiments().for_author("alice"), ["🙂", "🎉"]);
}

#[tokio::test]
async fn test_first_run_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let memory = SharedMemory::load(open(&dir), MemoryLimits::default()).await;
    assert_eq!(memory.snapshot().await, AgentMemory::default());
    assert_eq!(memory.agent_id(), "Codex");
}

#[tokio::test]
async fn test_oversized_legacy_ledger_loads_intact() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    // Written under a larger cap
    let wide = MemoryLimits {
        conversation_cap: 100,
        archive_floor: 25,
    };
    let mut memory = AgentMemory::default();
    for i in 0..70 {
        memory.record_exchange(&Exchange::new("general", format!("m{}", i)), "r", wide);
    }
    assert_ok!(store.save(&memory).await);

    let shared = SharedMemory::load(store, MemoryLimits::default()).await;
    assert_eq!(shared.read(|m| m.conversations().len()).await, 70);

    // Next append trims straight to the cap
    shared.record_exchange(&Exchange::new("general", "new"), "r").await;
    assert_eq!(shared.read(|m| m.conversations().len()).await, 50);
}

#[tokio::test]
async fn test_unwritable_path_is_an_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"not a directory").unwrap();

    assert_err!(SqliteBackend::open(&blocker.join("memory.db")).map(|_| ()));
}
