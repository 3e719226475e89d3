use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque ID types for type safety
pub type RoomId = String;
pub type PlayerId = String;

/// Normalize a room id before any lookup, creation or storage operation.
pub fn normalize_room_id(id: &str) -> RoomId {
    id.trim().to_lowercase()
}

/// Storage key for a room snapshot.
pub fn room_key(id: &str) -> String {
    format!("game:{}", normalize_room_id(id))
}

/// Prefix under which all room snapshots are persisted.
pub const ROOM_KEY_PREFIX: &str = "game:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Active,
    Grading,
    Ended,
}

/// One multiple-choice question. Always exactly four options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: usize,
}

impl Question {
    /// Exactly four options, correct index within them.
    pub fn is_well_formed(&self) -> bool {
        self.options.len() == 4 && self.correct_answer < 4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// False once the connection backing this identity went away mid-game.
    #[serde(default = "default_connected")]
    pub connected: bool,
}

fn default_connected() -> bool {
    true
}

/// Full room snapshot. This is the persisted record: one JSON document per
/// room, written whole on every mutation (no partial updates).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub status: RoomStatus,
    pub question_bank: Vec<Question>,
    pub selected_questions: Vec<Question>,
    pub current_question_index: usize,
    pub time_limit_ms: u64,
    pub players: Vec<Player>,
    pub scores: HashMap<PlayerId, u64>,
    pub response_times: HashMap<PlayerId, u64>,
    /// Points awarded this round, at most one entry per player. Cleared on
    /// every round advance.
    pub round_answers: HashMap<PlayerId, u64>,
    pub host_id: Option<PlayerId>,
    pub created_at: String,
    /// Bumped on every game start and admin reset; scheduled tasks from
    /// prior generations must no-op.
    #[serde(default)]
    pub generation: u64,
}

/// Per-connection role, claimed via query parameters on the WebSocket
/// upgrade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Admin,
}
