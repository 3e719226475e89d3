//! Room persistence.
//!
//! One full snapshot per room, keyed `game:<normalized-id>`. The contract
//! is deliberately minimal: get/put/delete/list-keys, full overwrite,
//! last-writer-wins. There is no atomicity across a fetch-then-store round
//! trip, which is why every mutation for a room runs on its single actor
//! (see `room::actor`).

mod cache;
mod file;

pub use cache::CachedStore;
pub use file::FileStore;

use crate::types::Room;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Trait all room stores implement
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Room>>;

    /// Full overwrite, no partial merge, no compare-and-swap.
    async fn put(&self, key: &str, room: &Room) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// In-memory store, used in tests and storeless deployments.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Room>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Room>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, room: &Room) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), room.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::*;

    /// Minimal Waiting room for store tests.
    pub fn sample_room(id: &str) -> Room {
        Room {
            id: id.to_string(),
            status: RoomStatus::Waiting,
            question_bank: vec![Question {
                text: "q".to_string(),
                help: None,
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: 1,
            }],
            selected_questions: Vec::new(),
            current_question_index: 0,
            time_limit_ms: 30_000,
            players: Vec::new(),
            scores: Default::default(),
            response_times: Default::default(),
            round_answers: Default::default(),
            host_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            generation: 0,
        }
    }
}
