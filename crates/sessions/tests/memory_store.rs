use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use ac_domain::capability::ExecutionStrategy;
use ac_domain::error::{Error, Result};
use ac_sessions::{ConversationTurn, DurableStore, FileStore, MemoryStore, SessionKey, SessionMemoryStore};

fn turn(n: usize) -> ConversationTurn {
    ConversationTurn::new(format!("request {n}"), format!("response {n}"), ExecutionStrategy::ToolFree)
}

fn requests(turns: &[ConversationTurn]) -> Vec<String> {
    turns.iter().map(|t| t.request.clone()).collect()
}

/// Wraps a `MemoryStore`; writes and deletes fail while `broken` is set.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    broken: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(Error::Store("disk full".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableStore for FlakyStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(key).await
    }
    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check()?;
        self.inner.write(key, value).await
    }
    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}

#[tokio::test]
async fn keeps_most_recent_turns_in_order() {
    let store = SessionMemoryStore::new(Arc::new(MemoryStore::new()), 3);
    let key = SessionKey::of("alice", "s1");
    for n in 1..=7 {
        store.append(&key, turn(n)).await;
    }
    let history = store.history(&key).await;
    assert_eq!(requests(&history), ["request 5", "request 6", "request 7"]);
    let ordinals: Vec<u64> = history.iter().map(|t| t.ordinal).collect();
    assert_eq!(ordinals, [5, 6, 7]);
}

#[tokio::test]
async fn bound_of_two_drops_first_turn() {
    let store = SessionMemoryStore::new(Arc::new(MemoryStore::new()), 2);
    let key = SessionKey::of("alice", "s1");
    for n in 1..=3 {
        store.append(&key, turn(n)).await;
    }
    assert_eq!(requests(&store.history(&key).await), ["request 2", "request 3"]);
}

#[tokio::test]
async fn clear_then_append_starts_fresh() {
    let durable = Arc::new(MemoryStore::new());
    let store = SessionMemoryStore::new(durable.clone(), 10);
    let key = SessionKey::of("alice", "s1");

    store.append(&key, turn(1)).await;
    store.append(&key, turn(2)).await;
    store.clear(&key).await;

    assert!(store.history(&key).await.is_empty());
    assert!(durable.get(&key.durable_key()).is_none());

    let stored = store.append(&key, turn(3)).await;
    assert_eq!(stored.ordinal, 1);
    assert_eq!(requests(&store.history(&key).await), ["request 3"]);
}

#[tokio::test]
async fn history_survives_restart() {
    let durable = Arc::new(MemoryStore::new());
    let key = SessionKey::of("alice", "s1");
    {
        let store = SessionMemoryStore::new(durable.clone(), 10);
        store.append(&key, turn(1)).await;
        store.append(&key, turn(2)).await;
    }

    let store = SessionMemoryStore::new(durable.clone(), 10);
    assert_eq!(requests(&store.history(&key).await), ["request 1", "request 2"]);
    let stored = store.append(&key, turn(3)).await;
    assert_eq!(stored.ordinal, 3);
}

#[tokio::test]
async fn smaller_bound_after_restart_trims_on_load() {
    let durable = Arc::new(MemoryStore::new());
    let key = SessionKey::of("alice", "s1");
    let store = SessionMemoryStore::new(durable.clone(), 10);
    for n in 1..=5 {
        store.append(&key, turn(n)).await;
    }

    let store = SessionMemoryStore::new(durable, 2);
    assert_eq!(requests(&store.history(&key).await), ["request 4", "request 5"]);
}

#[tokio::test]
async fn unreadable_blob_degrades_to_empty_session() {
    let durable = Arc::new(MemoryStore::new());
    let key = SessionKey::of("alice", "s1");
    durable.insert(key.durable_key(), b"{ not json".to_vec());

    let store = SessionMemoryStore::new(durable.clone(), 10);
    assert!(store.history(&key).await.is_empty());
    let health = store.health();
    assert_eq!(health.load_failures, 1);
    assert!(health.last_error.is_some());

    store.append(&key, turn(1)).await;
    let rewritten = durable.get(&key.durable_key()).unwrap();
    assert!(serde_json::from_slice::<serde_json::Value>(&rewritten).is_ok());
}

#[tokio::test]
async fn write_failure_keeps_in_memory_turn_and_is_reported() {
    let durable = Arc::new(FlakyStore::default());
    durable.broken.store(true, Ordering::SeqCst);
    let store = SessionMemoryStore::new(durable.clone(), 10);
    let key = SessionKey::of("alice", "s1");

    store.append(&key, turn(1)).await;
    assert_eq!(requests(&store.history(&key).await), ["request 1"]);

    let health = store.health();
    assert_eq!(health.persist_failures, 1);
    assert!(!health.is_healthy());
    assert!(health.last_error.unwrap().contains("disk full"));

    // Once the store recovers, the next append persists everything held.
    durable.broken.store(false, Ordering::SeqCst);
    store.append(&key, turn(2)).await;
    let restarted = SessionMemoryStore::new(durable, 10);
    assert_eq!(requests(&restarted.history(&key).await), ["request 1", "request 2"]);
}

#[tokio::test]
async fn concurrent_appends_to_one_key_are_serialized() {
    let durable = Arc::new(MemoryStore::new());
    let store = Arc::new(SessionMemoryStore::new(durable.clone(), 100));
    let key = SessionKey::of("alice", "s1");

    let mut tasks = Vec::new();
    for n in 0..20 {
        let store = store.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move { store.append(&key, turn(n)).await }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let history = store.history(&key).await;
    assert_eq!(history.len(), 20);
    let ordinals: Vec<u64> = history.iter().map(|t| t.ordinal).collect();
    assert_eq!(ordinals, (1..=20).collect::<Vec<u64>>());

    // The durable copy matches what is held in memory.
    let restarted = SessionMemoryStore::new(durable, 100);
    assert_eq!(restarted.history(&key).await, history);
}

#[tokio::test]
async fn sessions_are_independent_per_key() {
    let store = SessionMemoryStore::new(Arc::new(MemoryStore::new()), 10);
    let a = SessionKey::of("alice", "s1");
    let b = SessionKey::of("alice", "s2");
    let c = SessionKey::of("bob", "s1");

    store.append(&a, turn(1)).await;
    store.append(&b, turn(2)).await;
    store.append(&c, turn(3)).await;
    store.clear(&a).await;

    assert!(store.history(&a).await.is_empty());
    assert_eq!(requests(&store.history(&b).await), ["request 2"]);
    assert_eq!(requests(&store.history(&c).await), ["request 3"]);
}

#[tokio::test]
async fn list_sessions_newest_first() {
    let durable = Arc::new(MemoryStore::new());
    let store = SessionMemoryStore::new(durable.clone(), 10);
    let older = SessionKey::of("alice", "older");
    let newer = SessionKey::of("alice", "newer");

    store.append(&older, turn(1)).await;
    store.append(&older, turn(2)).await;
    store.append(&newer, turn(3)).await;
    store.append(&SessionKey::of("bob", "other"), turn(4)).await;

    let listed = store.list_sessions("alice").await;
    let ids: Vec<&str> = listed.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, ["newer", "older"]);
    assert_eq!(listed[1].turn_count, 2);

    // A fresh process sees the same listing from the durable copies alone.
    let restarted = SessionMemoryStore::new(durable, 10);
    assert_eq!(restarted.list_sessions("alice").await.len(), 2);

    store.clear(&older).await;
    let ids: Vec<String> = store
        .list_sessions("alice")
        .await
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(ids, ["newer"]);
}

#[tokio::test]
async fn file_store_round_trip_through_memory_store() {
    let dir = tempfile::tempdir().unwrap();
    let key = SessionKey::new("alice", None);
    {
        let store = SessionMemoryStore::new(Arc::new(FileStore::new(dir.path())), 10);
        store.append(&key, turn(1)).await;
    }
    assert!(dir.path().join(key.durable_key()).exists());

    let store = SessionMemoryStore::new(Arc::new(FileStore::new(dir.path())), 10);
    assert_eq!(requests(&store.history(&key).await), ["request 1"]);
    store.clear(&key).await;
    assert!(!dir.path().join(key.durable_key()).exists());
}

#[tokio::test]
async fn ids_that_differ_only_in_unsafe_characters_stay_apart() {
    let durable = Arc::new(MemoryStore::new());
    let zhang = SessionKey::of("张三", "s1");
    let li = SessionKey::of("李四", "s1");
    let slash = SessionKey::of("a/b", "s1");
    let underscore = SessionKey::of("a_b", "s1");
    {
        let store = SessionMemoryStore::new(durable.clone(), 10);
        store.append(&zhang, turn(1)).await;
        store.append(&slash, turn(2)).await;
    }
    assert_eq!(durable.len(), 2);

    let restarted = SessionMemoryStore::new(durable, 10);
    assert!(restarted.history(&li).await.is_empty());
    assert!(restarted.history(&underscore).await.is_empty());
    assert_eq!(requests(&restarted.history(&zhang).await), ["request 1"]);
    assert_eq!(requests(&restarted.history(&slash).await), ["request 2"]);
    assert!(restarted.health().is_healthy());
}

#[tokio::test]
async fn blob_written_for_another_key_is_not_loaded() {
    let durable = Arc::new(MemoryStore::new());
    let owner = SessionKey::of("alice", "s1");
    let other = SessionKey::of("bob", "s1");
    SessionMemoryStore::new(durable.clone(), 10).append(&owner, turn(1)).await;
    durable.insert(other.durable_key(), durable.get(&owner.durable_key()).unwrap());

    let store = SessionMemoryStore::new(durable, 10);
    assert!(store.history(&other).await.is_empty());
    assert_eq!(store.health().load_failures, 1);
    assert!(store.list_sessions("bob").await.is_empty());

    let stored = store.append(&other, turn(2)).await;
    assert_eq!(stored.ordinal, 1);
}

#[tokio::test]
async fn clear_and_unknown_reads_do_not_grow_the_cache() {
    let store = SessionMemoryStore::new(Arc::new(MemoryStore::new()), 10);
    let a = SessionKey::of("alice", "s1");
    let b = SessionKey::of("alice", "s2");
    store.append(&a, turn(1)).await;
    store.append(&b, turn(2)).await;
    assert_eq!(store.health().cached_sessions, 2);

    store.clear(&a).await;
    assert_eq!(store.health().cached_sessions, 1);
    assert!(store.history(&a).await.is_empty());

    for _ in 0..5 {
        assert!(store.history(&SessionKey::new("alice", None)).await.is_empty());
    }
    assert_eq!(store.health().cached_sessions, 1);
}

#[tokio::test]
async fn cache_limit_evicts_idle_sessions_which_reload_from_durable() {
    let store = SessionMemoryStore::new(Arc::new(MemoryStore::new()), 10).with_cache_limit(2);
    let keys: Vec<SessionKey> = (1..=3).map(|n| SessionKey::of("alice", format!("s{n}"))).collect();
    for (n, key) in keys.iter().enumerate() {
        store.append(key, turn(n + 1)).await;
    }
    assert_eq!(store.health().cached_sessions, 2);

    assert_eq!(requests(&store.history(&keys[0]).await), ["request 1"]);
    assert_eq!(store.health().cached_sessions, 2);
    assert_eq!(store.append(&keys[0], turn(4)).await.ordinal, 2);
}

#[tokio::test]
async fn unpersisted_sessions_are_never_evicted() {
    let durable = Arc::new(FlakyStore::default());
    durable.broken.store(true, Ordering::SeqCst);
    let store = SessionMemoryStore::new(durable.clone(), 10).with_cache_limit(1);
    let a = SessionKey::of("alice", "s1");
    let b = SessionKey::of("alice", "s2");

    store.append(&a, turn(1)).await;
    store.append(&b, turn(2)).await;
    assert_eq!(store.health().cached_sessions, 2);
    assert_eq!(requests(&store.history(&a).await), ["request 1"]);
}
