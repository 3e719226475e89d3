use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateGame {
        questions: Vec<Question>,
        #[serde(default)]
        room_id: Option<String>,
    },
    JoinGame {
        game_id: String,
        player_name: String,
        /// Present when a reconnecting client wants its prior identity back
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    StartGame {
        game_id: String,
    },
    SubmitAnswer {
        game_id: String,
        answer: usize,
        time_left: u64,
    },
    RequestGameId,
    RequestSnapshot {
        game_id: String,
    },
    // Admin-only messages
    AdminClearAll,
    AdminStartGame,
    PlayerDisconnected {
        game_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    GameId {
        game_id: RoomId,
    },
    GameCreated {
        game_id: RoomId,
    },
    PlayerJoined {
        players: Vec<Player>,
        host_id: Option<PlayerId>,
        scores: HashMap<PlayerId, u64>,
        response_times: HashMap<PlayerId, u64>,
    },
    GameStarted {
        question: QuestionInfo,
        time_limit: u64,
    },
    ScoresUpdated {
        scores: HashMap<PlayerId, u64>,
        response_times: HashMap<PlayerId, u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        players: Option<Vec<Player>>,
    },
    AnswerResult {
        player_id: PlayerId,
        is_correct: bool,
        points: u64,
        time_taken: u64,
    },
    GameEnded {
        scores: HashMap<PlayerId, u64>,
        response_times: HashMap<PlayerId, u64>,
        /// Final standing, best first
        rankings: Vec<PlayerId>,
    },
    GameReset,
    /// Full current state for a (re)attaching connection; clients rebuild
    /// their view from this plus subsequent live broadcasts.
    Snapshot {
        game_id: RoomId,
        status: RoomStatus,
        players: Vec<Player>,
        scores: HashMap<PlayerId, u64>,
        response_times: HashMap<PlayerId, u64>,
        host_id: Option<PlayerId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_question: Option<QuestionInfo>,
        time_limit: u64,
    },
    Error {
        message: String,
    },
    AdminSuccess {
        message: String,
    },
    AdminError {
        message: String,
    },
}

/// Public question view (no correct_answer to prevent spoilers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInfo {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    pub options: Vec<String>,
}

impl From<&Question> for QuestionInfo {
    fn from(q: &Question) -> Self {
        Self {
            text: q.text.clone(),
            help: q.help.clone(),
            options: q.options.clone(),
        }
    }
}
