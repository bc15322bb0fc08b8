//! Durable blob storage behind the session store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use ac_domain::error::Result;

/// Key/value blob storage. Keys are `/`-separated relative paths.
///
/// No multi-key transactions. Each `write` replaces the whole value.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// The stored value, or `None` when the key is absent.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn write(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys directly under `prefix`, which names a directory and ends in `/`.
    /// Keys in deeper directories are not included.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Process-local store. Contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value under `key`, bypassing the async interface.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(key).cloned()
    }

    /// Store a raw value under `key`, bypassing the async interface.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.blobs.write().insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        self.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|k| k.strip_prefix(prefix).is_some_and(|rest| !rest.contains('/')))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_basics() {
        let store = MemoryStore::new();
        assert_eq!(store.read("a/b.json").await.unwrap(), None);

        store.write("a/b.json", b"1").await.unwrap();
        store.write("a/c.json", b"2").await.unwrap();
        store.write("a/deep/d.json", b"3").await.unwrap();
        store.write("ab/e.json", b"4").await.unwrap();

        assert_eq!(store.read("a/b.json").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.list("a/").await.unwrap(), ["a/b.json", "a/c.json"]);

        store.delete("a/b.json").await.unwrap();
        store.delete("a/missing.json").await.unwrap();
        assert_eq!(store.list("a/").await.unwrap(), ["a/c.json"]);
    }
}
