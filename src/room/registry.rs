//! Room registry: normalized id -> live actor handle.
//!
//! Explicitly passed to every handler instead of process-wide globals.
//! Rooms are independent units of concurrency; the registry only hands out
//! handles and never touches room state itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{broadcast, RwLock};

use crate::config::Config;
use crate::error::{GameError, Result};
use crate::loader::QuizDefinition;
use crate::protocol::ServerMessage;
use crate::room::actor::{RoomActor, RoomHandle};
use crate::room::score::RankingHook;
use crate::store::RoomStore;
use crate::types::*;

const GENERATED_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const GENERATED_ID_LENGTH: usize = 6;

pub struct RoomRegistry {
    store: Arc<dyn RoomStore>,
    config: Arc<Config>,
    ranking_hook: Option<RankingHook>,
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    current_room: RwLock<Option<RoomId>>,
    /// Bumped on every admin reset; rooms carry the value they were
    /// created under so stale timers can be told apart.
    generation: AtomicU64,
    global_events: broadcast::Sender<ServerMessage>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn RoomStore>, config: Arc<Config>) -> Self {
        let (global_events, _) = broadcast::channel(100);
        Self {
            store,
            config,
            ranking_hook: None,
            rooms: RwLock::new(HashMap::new()),
            current_room: RwLock::new(None),
            generation: AtomicU64::new(0),
            global_events,
        }
    }

    /// Install the single declared ranking post-processing hook.
    pub fn with_ranking_hook(mut self, hook: RankingHook) -> Self {
        self.ranking_hook = Some(hook);
        self
    }

    /// Events every connected client receives regardless of room.
    pub fn subscribe_global(&self) -> broadcast::Receiver<ServerMessage> {
        self.global_events.subscribe()
    }

    /// The room answered by `requestGameId`.
    pub async fn current_game_id(&self) -> Option<RoomId> {
        self.current_room.read().await.clone()
    }

    /// Create a room with the given bank, failing on id conflicts.
    pub async fn create_room(
        &self,
        questions: Vec<Question>,
        custom_id: Option<String>,
        host_id: Option<PlayerId>,
    ) -> Result<RoomId> {
        if questions.is_empty() {
            return Err(GameError::validation("A game needs at least one question"));
        }
        if let Some(bad) = questions.iter().find(|q| !q.is_well_formed()) {
            return Err(GameError::Validation(format!(
                "Malformed question '{}': four options and a correct index in range are required",
                bad.text
            )));
        }

        let id = match custom_id {
            Some(raw) => {
                let id = normalize_room_id(&raw);
                if id.is_empty() {
                    return Err(GameError::validation("Room id must not be empty"));
                }
                id
            }
            None => generate_room_id(),
        };

        let key = room_key(&id);
        if self.store.get(&key).await?.is_some() {
            return Err(GameError::Conflict(id));
        }

        let mut room = Room::new(id.clone(), questions, self.config.time_limit_ms, host_id);
        room.generation = self.generation.load(Ordering::SeqCst);
        self.store.put(&key, &room).await?;

        self.spawn_actor(&id).await;
        tracing::info!(room = %id, "room created");
        Ok(id)
    }

    /// Handle for a live room, reviving the actor from the store after a
    /// restart if needed.
    pub async fn handle(&self, raw_id: &str) -> Result<RoomHandle> {
        let id = normalize_room_id(raw_id);
        if let Some(handle) = self.rooms.read().await.get(&id) {
            return Ok(handle.clone());
        }
        if self.store.get(&room_key(&id)).await?.is_none() {
            return Err(GameError::NotFound(id));
        }
        Ok(self.spawn_actor(&id).await)
    }

    /// Load the default quiz room at startup (and after each reset):
    /// creates it when absent, marks it current either way.
    pub async fn load_default(&self, quiz: &QuizDefinition) -> Result<RoomId> {
        let id = normalize_room_id(&quiz.room_id);
        let key = room_key(&id);

        if self.store.get(&key).await?.is_none() {
            let mut room = Room::new(
                id.clone(),
                quiz.questions.clone(),
                self.config.time_limit_ms,
                None,
            );
            room.generation = self.generation.load(Ordering::SeqCst);
            self.store.put(&key, &room).await?;
            tracing::info!(room = %id, questions = quiz.questions.len(), "default room created");
        } else {
            tracing::info!(room = %id, "default room already present");
        }

        if !self.rooms.read().await.contains_key(&id) {
            self.spawn_actor(&id).await;
        }
        *self.current_room.write().await = Some(id.clone());
        Ok(id)
    }

    /// Wipe every persisted room, stop all actors, reload the default
    /// definition and tell every connected client to drop to its idle
    /// view. Supersedes any in-flight round.
    pub async fn admin_reset(&self, quiz: &QuizDefinition) -> Result<RoomId> {
        let handles: Vec<RoomHandle> = {
            let mut rooms = self.rooms.write().await;
            rooms.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            handle.shutdown().await;
        }

        for key in self.store.list_keys(ROOM_KEY_PREFIX).await? {
            self.store.delete(&key).await?;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);

        let id = self.load_default(quiz).await?;
        let _ = self.global_events.send(ServerMessage::GameReset);
        tracing::info!(room = %id, "all game data cleared and default room reloaded");
        Ok(id)
    }

    async fn spawn_actor(&self, id: &RoomId) -> RoomHandle {
        let mut rooms = self.rooms.write().await;
        // Double-checked under the write lock so two callers cannot race
        // two actors into existence for one room.
        if let Some(handle) = rooms.get(id) {
            return handle.clone();
        }
        let handle = RoomActor::spawn(
            id,
            self.store.clone(),
            self.config.clone(),
            self.ranking_hook.clone(),
        );
        rooms.insert(id.clone(), handle.clone());
        handle
    }
}

fn generate_room_id() -> RoomId {
    let mut rng = rand::rng();
    (0..GENERATED_ID_LENGTH)
        .map(|_| GENERATED_ID_CHARS[rng.random_range(0..GENERATED_ID_CHARS.len())] as char)
        .collect()
}
