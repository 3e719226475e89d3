//! Best-effort in-memory mirror in front of a backing store. The store
//! remains the source of truth: the mirror is refreshed on every
//! successful put and never updated when the backing write fails.

use super::{RoomStore, StoreResult};
use crate::types::Room;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct CachedStore {
    inner: Arc<dyn RoomStore>,
    mirror: RwLock<HashMap<String, Room>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn RoomStore>) -> Self {
        Self {
            inner,
            mirror: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    async fn cached(&self, key: &str) -> Option<Room> {
        self.mirror.read().await.get(key).cloned()
    }
}

#[async_trait]
impl RoomStore for CachedStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Room>> {
        if let Some(room) = self.mirror.read().await.get(key) {
            return Ok(Some(room.clone()));
        }
        let fetched = self.inner.get(key).await?;
        if let Some(ref room) = fetched {
            self.mirror
                .write()
                .await
                .insert(key.to_string(), room.clone());
        }
        Ok(fetched)
    }

    async fn put(&self, key: &str, room: &Room) -> StoreResult<()> {
        // Backing store first; a failed write must not poison the mirror.
        self.inner.put(key, room).await?;
        self.mirror
            .write()
            .await
            .insert(key.to_string(), room.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await?;
        self.mirror.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        // The mirror only holds recently touched rooms, so listing always
        // goes to the source of truth.
        self.inner.list_keys(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::sample_room;
    use super::super::{MemoryStore, StoreError};
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl RoomStore for FailingStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<Room>> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store unreachable",
            )))
        }

        async fn put(&self, _key: &str, _room: &Room) -> StoreResult<()> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store unreachable",
            )))
        }

        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn list_keys(&self, _prefix: &str) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_get_fills_mirror() {
        let inner = Arc::new(MemoryStore::new());
        inner.put("game:a", &sample_room("a")).await.unwrap();

        let cached = CachedStore::new(inner);
        assert!(cached.cached("game:a").await.is_none());
        cached.get("game:a").await.unwrap().unwrap();
        assert!(cached.cached("game:a").await.is_some());
    }

    #[tokio::test]
    async fn test_put_refreshes_mirror() {
        let inner = Arc::new(MemoryStore::new());
        let cached = CachedStore::new(inner);

        let mut room = sample_room("a");
        cached.put("game:a", &room).await.unwrap();
        room.scores.insert("p1".to_string(), 300);
        cached.put("game:a", &room).await.unwrap();

        let mirrored = cached.cached("game:a").await.unwrap();
        assert_eq!(mirrored.scores.get("p1"), Some(&300));
    }

    #[tokio::test]
    async fn test_failed_put_leaves_mirror_untouched() {
        let cached = CachedStore::new(Arc::new(FailingStore));
        let room = sample_room("a");

        assert!(cached.put("game:a", &room).await.is_err());
        assert!(cached.cached("game:a").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_evicts() {
        let inner = Arc::new(MemoryStore::new());
        let cached = CachedStore::new(inner);
        cached.put("game:a", &sample_room("a")).await.unwrap();
        cached.delete("game:a").await.unwrap();
        assert!(cached.cached("game:a").await.is_none());
        assert!(cached.get("game:a").await.unwrap().is_none());
    }
}
