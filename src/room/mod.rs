//! Room lifecycle state machine.
//!
//! All methods here are synchronous and operate on an owned `Room`
//! snapshot; the per-room actor (`actor.rs`) is the only caller for live
//! rooms and provides the load -> mutate -> store serialization.

pub mod actor;
pub mod registry;
pub mod score;

use crate::error::{GameError, Result};
use crate::types::*;

/// Who is asking for a privileged operation.
#[derive(Debug, Clone, Copy)]
pub enum Requester<'a> {
    Host(&'a PlayerId),
    /// Admin-designated identity; bypasses the host check.
    Admin,
}

#[derive(Debug, PartialEq)]
pub enum JoinOutcome {
    NewPlayer,
    /// An existing identity re-attached; score and time are untouched.
    Rebound,
}

#[derive(Debug)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub points: u64,
    pub time_taken: u64,
}

#[derive(Debug)]
pub enum Advance {
    Next(Question),
    Finished { rankings: Vec<PlayerId> },
}

impl Room {
    pub fn new(
        id: RoomId,
        question_bank: Vec<Question>,
        time_limit_ms: u64,
        host_id: Option<PlayerId>,
    ) -> Self {
        Self {
            id,
            status: RoomStatus::Waiting,
            question_bank,
            selected_questions: Vec::new(),
            current_question_index: 0,
            time_limit_ms,
            players: Vec::new(),
            scores: Default::default(),
            response_times: Default::default(),
            round_answers: Default::default(),
            host_id,
            created_at: chrono::Utc::now().to_rfc3339(),
            generation: 0,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.selected_questions.get(self.current_question_index)
    }

    /// Append a player, or rebind a returning identity. Valid while the
    /// room still accepts participants; a late joiner during an active
    /// game observes from the current round on without retroactive credit.
    pub fn join(&mut self, player_id: &PlayerId, name: &str) -> Result<JoinOutcome> {
        if self.status == RoomStatus::Ended {
            return Err(GameError::validation("The game has already ended"));
        }
        if name.trim().is_empty() {
            return Err(GameError::validation("Player name must not be empty"));
        }

        if let Some(existing) = self.players.iter_mut().find(|p| &p.id == player_id) {
            existing.connected = true;
            existing.name = name.trim().to_string();
            return Ok(JoinOutcome::Rebound);
        }

        self.players.push(Player {
            id: player_id.clone(),
            name: name.trim().to_string(),
            connected: true,
        });
        self.scores.insert(player_id.clone(), 0);
        self.response_times.insert(player_id.clone(), 0);
        Ok(JoinOutcome::NewPlayer)
    }

    /// Draw a fresh question sample and enter Active. Hosts may only start
    /// a Waiting room; an admin may (re)start from any state.
    pub fn start(&mut self, requester: Requester<'_>, question_count: usize) -> Result<&Question> {
        match requester {
            Requester::Host(id) => {
                if self.host_id.as_ref() != Some(id) {
                    return Err(GameError::unauthorized(
                        "Only the host can start the game",
                    ));
                }
                if self.status != RoomStatus::Waiting {
                    return Err(GameError::validation("The game has already started"));
                }
            }
            Requester::Admin => {}
        }
        if self.question_bank.is_empty() {
            return Err(GameError::validation("The question bank is empty"));
        }

        self.selected_questions = draw_questions(&self.question_bank, question_count);
        self.current_question_index = 0;
        for value in self.scores.values_mut() {
            *value = 0;
        }
        for value in self.response_times.values_mut() {
            *value = 0;
        }
        self.round_answers.clear();
        self.status = RoomStatus::Active;
        // Invalidate timers armed for any previous run of this room.
        self.generation += 1;

        Ok(&self.selected_questions[0])
    }

    /// Record an answer for the current round. A player's second submission
    /// for the same round is a silent no-op (`Ok(None)`).
    pub fn submit_answer(
        &mut self,
        player_id: &PlayerId,
        answer: usize,
        time_left_ms: u64,
    ) -> Result<Option<AnswerOutcome>> {
        if self.status != RoomStatus::Active {
            return Err(GameError::validation("The game is not accepting answers"));
        }
        if !self.players.iter().any(|p| &p.id == player_id) {
            return Err(GameError::validation("You are not part of this game"));
        }
        if answer > 3 {
            return Err(GameError::validation("Answer index out of range"));
        }
        if self.round_answers.contains_key(player_id) {
            return Ok(None);
        }

        let question = self
            .current_question()
            .ok_or_else(|| GameError::validation("The game has not been started properly"))?;
        let is_correct = answer == question.correct_answer;

        let time_left = time_left_ms.min(self.time_limit_ms);
        let points = score::points_for(is_correct, time_left);
        let time_taken = self.time_limit_ms - time_left;

        *self.scores.entry(player_id.clone()).or_insert(0) += points;
        *self.response_times.entry(player_id.clone()).or_insert(0) += time_taken;
        self.round_answers.insert(player_id.clone(), points);

        Ok(Some(AnswerOutcome {
            is_correct,
            points,
            time_taken,
        }))
    }

    /// Every currently connected player has answered this round.
    pub fn all_answered(&self) -> bool {
        let connected: Vec<_> = self.players.iter().filter(|p| p.connected).collect();
        !connected.is_empty()
            && connected
                .iter()
                .all(|p| self.round_answers.contains_key(&p.id))
    }

    /// Active -> Grading, once the round is complete or timed out.
    pub fn finish_round(&mut self) {
        if self.status == RoomStatus::Active {
            self.status = RoomStatus::Grading;
        }
    }

    /// Grading -> Active with the next question, or -> Ended when the
    /// selection is exhausted.
    pub fn advance(&mut self, hook: Option<&score::RankingHook>) -> Advance {
        self.current_question_index += 1;
        if self.current_question_index < self.selected_questions.len() {
            self.round_answers.clear();
            self.status = RoomStatus::Active;
            Advance::Next(self.selected_questions[self.current_question_index].clone())
        } else {
            // index == len <=> Ended
            self.current_question_index = self.selected_questions.len();
            self.status = RoomStatus::Ended;
            Advance::Finished {
                rankings: score::rankings(self, hook),
            }
        }
    }

    /// Handle a connection going away. In the lobby the record is removed
    /// outright; mid-game it is only flagged so scores survive a rejoin.
    /// A departing host gives up the host designation.
    pub fn mark_disconnected(&mut self, player_id: &PlayerId) {
        if self.host_id.as_ref() == Some(player_id) {
            self.host_id = None;
        }
        match self.status {
            RoomStatus::Waiting | RoomStatus::Ended => {
                self.players.retain(|p| &p.id != player_id);
                self.scores.remove(player_id);
                self.response_times.remove(player_id);
                self.round_answers.remove(player_id);
            }
            RoomStatus::Active | RoomStatus::Grading => {
                if let Some(player) = self.players.iter_mut().find(|p| &p.id == player_id) {
                    player.connected = false;
                }
            }
        }
    }
}

/// Uniformly-random sample without replacement; the whole bank when it is
/// smaller than the requested count.
fn draw_questions(bank: &[Question], count: usize) -> Vec<Question> {
    if bank.len() <= count {
        tracing::warn!(
            requested = count,
            available = bank.len(),
            "question bank smaller than sample size, using all questions"
        );
        return bank.to_vec();
    }
    let mut rng = rand::rng();
    rand::seq::index::sample(&mut rng, bank.len(), count)
        .into_iter()
        .map(|i| bank[i].clone())
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::*;

    pub fn question(text: &str, correct: usize) -> Question {
        Question {
            text: text.to_string(),
            help: None,
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: correct,
        }
    }

    pub fn room_with_questions(n: usize) -> Room {
        let bank = (0..n).map(|i| question(&format!("q{i}"), 0)).collect();
        Room::new("testroom".to_string(), bank, 30_000, None)
    }
}
