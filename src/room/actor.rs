//! Per-room serial worker.
//!
//! Every mutating command for a room goes through this actor's queue, so
//! no two load -> mutate -> put sequences for the same room can ever
//! interleave. The store offers no compare-and-swap, which makes this the
//! only correct writer. Scheduled round-advance and timeout commands are
//! tagged with the room generation and question index they were armed for
//! and no-op when either has moved on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::Config;
use crate::error::{GameError, Result};
use crate::protocol::{QuestionInfo, ServerMessage};
use crate::room::{score::RankingHook, Advance, Requester};
use crate::store::RoomStore;
use crate::types::*;

const COMMAND_QUEUE_DEPTH: usize = 64;
const EVENT_CHANNEL_DEPTH: usize = 100;

#[derive(Debug)]
pub enum RoomCommand {
    Join {
        player_id: PlayerId,
        name: String,
        reply: oneshot::Sender<Result<Vec<ServerMessage>>>,
    },
    Start {
        /// None = admin override (bypasses the host check)
        requester: Option<PlayerId>,
        reply: oneshot::Sender<Result<()>>,
    },
    SubmitAnswer {
        player_id: PlayerId,
        answer: usize,
        time_left: u64,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<ServerMessage>>,
    },
    Disconnect {
        player_id: PlayerId,
    },
    /// Grading -> next question / game end, armed when entering Grading
    Advance {
        generation: u64,
        question_index: usize,
    },
    /// Wall-clock limit for a round, armed when entering Active
    RoundTimeout {
        generation: u64,
        question_index: usize,
    },
    /// Stop the actor; acked only after every queued command has drained,
    /// so the last write for this room is already in the store.
    Shutdown { ack: oneshot::Sender<()> },
}

/// Cheap handle to a live room actor.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub tx: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<ServerMessage>,
}

impl RoomHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> RoomCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| GameError::validation("The game is no longer available"))?;
        rx.await
            .map_err(|_| GameError::validation("The game is no longer available"))?
    }

    pub async fn join(&self, player_id: PlayerId, name: String) -> Result<Vec<ServerMessage>> {
        self.request(|reply| RoomCommand::Join {
            player_id,
            name,
            reply,
        })
        .await
    }

    pub async fn start(&self, requester: Option<PlayerId>) -> Result<()> {
        self.request(|reply| RoomCommand::Start { requester, reply })
            .await
    }

    pub async fn submit_answer(
        &self,
        player_id: PlayerId,
        answer: usize,
        time_left: u64,
    ) -> Result<()> {
        self.request(|reply| RoomCommand::SubmitAnswer {
            player_id,
            answer,
            time_left,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<ServerMessage> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    pub async fn disconnect(&self, player_id: PlayerId) {
        let _ = self.tx.send(RoomCommand::Disconnect { player_id }).await;
    }

    /// Stop the actor and wait until it has drained its queue. Callers
    /// that go on to touch this room's key must await this, or an
    /// in-flight write could land after theirs.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(RoomCommand::Shutdown { ack: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

pub struct RoomActor {
    key: String,
    store: Arc<dyn RoomStore>,
    config: Arc<Config>,
    ranking_hook: Option<RankingHook>,
    rx: mpsc::Receiver<RoomCommand>,
    self_tx: mpsc::WeakSender<RoomCommand>,
    events: broadcast::Sender<ServerMessage>,
}

impl RoomActor {
    /// Spawn the serial worker for one room and return its handle.
    pub fn spawn(
        room_id: &RoomId,
        store: Arc<dyn RoomStore>,
        config: Arc<Config>,
        ranking_hook: Option<RankingHook>,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);

        let actor = RoomActor {
            key: room_key(room_id),
            store,
            config,
            ranking_hook,
            rx,
            self_tx: tx.downgrade(),
            events: events.clone(),
        };
        tokio::spawn(actor.run());

        RoomHandle { tx, events }
    }

    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                RoomCommand::Join {
                    player_id,
                    name,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(player_id, name).await);
                }
                RoomCommand::Start { requester, reply } => {
                    let _ = reply.send(self.handle_start(requester).await);
                }
                RoomCommand::SubmitAnswer {
                    player_id,
                    answer,
                    time_left,
                    reply,
                } => {
                    let _ = reply
                        .send(self.handle_submit(player_id, answer, time_left).await);
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.handle_snapshot().await);
                }
                RoomCommand::Disconnect { player_id } => {
                    if let Err(e) = self.handle_disconnect(player_id).await {
                        tracing::error!(key = %self.key, "disconnect handling failed: {e}");
                    }
                }
                RoomCommand::Advance {
                    generation,
                    question_index,
                } => {
                    if let Err(e) = self.handle_advance(generation, question_index).await {
                        tracing::error!(key = %self.key, "round advance failed: {e}");
                    }
                }
                RoomCommand::RoundTimeout {
                    generation,
                    question_index,
                } => {
                    if let Err(e) = self.handle_timeout(generation, question_index).await {
                        tracing::error!(key = %self.key, "round timeout failed: {e}");
                    }
                }
                RoomCommand::Shutdown { ack } => {
                    let _ = ack.send(());
                    break;
                }
            }
        }
        tracing::debug!(key = %self.key, "room actor stopped");
    }

    async fn load(&self) -> Result<Room> {
        self.store
            .get(&self.key)
            .await?
            .ok_or_else(|| GameError::NotFound(self.key.clone()))
    }

    fn broadcast(&self, msg: ServerMessage) {
        // No receivers connected is fine
        let _ = self.events.send(msg);
    }

    fn schedule(&self, cmd: RoomCommand, after: Duration) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(cmd).await;
        });
    }

    fn arm_round_timeout(&self, room: &Room) {
        self.schedule(
            RoomCommand::RoundTimeout {
                generation: room.generation,
                question_index: room.current_question_index,
            },
            // The room's own limit, not the config one: a revived room
            // keeps scoring and timing out against the limit it was
            // created under.
            Duration::from_millis(room.time_limit_ms + self.config.round_grace_ms),
        );
    }

    fn arm_advance(&self, room: &Room) {
        self.schedule(
            RoomCommand::Advance {
                generation: room.generation,
                question_index: room.current_question_index,
            },
            Duration::from_millis(self.config.grading_delay_ms),
        );
    }

    fn scores_update(room: &Room) -> ServerMessage {
        ServerMessage::ScoresUpdated {
            scores: room.scores.clone(),
            response_times: room.response_times.clone(),
            players: Some(room.players.clone()),
        }
    }

    async fn handle_join(
        &self,
        player_id: PlayerId,
        name: String,
    ) -> Result<Vec<ServerMessage>> {
        let mut room = self.load().await?;
        room.join(&player_id, &name)?;
        self.store.put(&self.key, &room).await?;

        self.broadcast(ServerMessage::PlayerJoined {
            players: room.players.clone(),
            host_id: room.host_id.clone(),
            scores: room.scores.clone(),
            response_times: room.response_times.clone(),
        });

        // A late joiner mid-game (Active or Grading) gets the current
        // question and standings directly; it earns no credit for past
        // rounds.
        let mut direct = Vec::new();
        if matches!(room.status, RoomStatus::Active | RoomStatus::Grading) {
            if let Some(question) = room.current_question() {
                direct.push(ServerMessage::GameStarted {
                    question: QuestionInfo::from(question),
                    time_limit: room.time_limit_ms,
                });
                direct.push(Self::scores_update(&room));
            }
        }
        Ok(direct)
    }

    async fn handle_start(&self, requester: Option<PlayerId>) -> Result<()> {
        let mut room = self.load().await?;
        let question = match &requester {
            Some(id) => room.start(Requester::Host(id), self.config.question_count)?,
            None => room.start(Requester::Admin, self.config.question_count)?,
        };
        let first = QuestionInfo::from(question);
        self.store.put(&self.key, &room).await?;

        tracing::info!(
            key = %self.key,
            questions = room.selected_questions.len(),
            "game started"
        );
        self.broadcast(ServerMessage::GameStarted {
            question: first,
            time_limit: room.time_limit_ms,
        });
        self.arm_round_timeout(&room);
        Ok(())
    }

    async fn handle_submit(
        &self,
        player_id: PlayerId,
        answer: usize,
        time_left: u64,
    ) -> Result<()> {
        let mut room = self.load().await?;
        let Some(outcome) = room.submit_answer(&player_id, answer, time_left)? else {
            tracing::debug!(key = %self.key, player = %player_id, "duplicate answer ignored");
            return Ok(());
        };

        let round_complete = room.all_answered();
        if round_complete {
            room.finish_round();
        }
        self.store.put(&self.key, &room).await?;

        self.broadcast(Self::scores_update(&room));
        self.broadcast(ServerMessage::AnswerResult {
            player_id,
            is_correct: outcome.is_correct,
            points: outcome.points,
            time_taken: outcome.time_taken,
        });

        if round_complete {
            self.arm_advance(&room);
        }
        Ok(())
    }

    async fn handle_snapshot(&self) -> Result<ServerMessage> {
        let room = self.load().await?;
        let current_question = match room.status {
            RoomStatus::Active => room.current_question().map(QuestionInfo::from),
            _ => None,
        };
        Ok(ServerMessage::Snapshot {
            game_id: room.id.clone(),
            status: room.status,
            players: room.players.clone(),
            scores: room.scores.clone(),
            response_times: room.response_times.clone(),
            host_id: room.host_id.clone(),
            current_question,
            time_limit: room.time_limit_ms,
        })
    }

    async fn handle_disconnect(&self, player_id: PlayerId) -> Result<()> {
        let mut room = self.load().await?;
        room.mark_disconnected(&player_id);

        // A departure can complete the round for everyone else.
        let round_complete = room.status == RoomStatus::Active && room.all_answered();
        if round_complete {
            room.finish_round();
        }
        self.store.put(&self.key, &room).await?;

        self.broadcast(Self::scores_update(&room));
        if round_complete {
            self.arm_advance(&room);
        }
        Ok(())
    }

    async fn handle_advance(&self, generation: u64, question_index: usize) -> Result<()> {
        let mut room = self.load().await?;
        if room.generation != generation
            || room.status != RoomStatus::Grading
            || room.current_question_index != question_index
        {
            tracing::debug!(key = %self.key, "stale advance timer ignored");
            return Ok(());
        }

        match room.advance(self.ranking_hook.as_ref()) {
            Advance::Next(question) => {
                self.store.put(&self.key, &room).await?;
                self.broadcast(ServerMessage::GameStarted {
                    question: QuestionInfo::from(&question),
                    time_limit: room.time_limit_ms,
                });
                self.broadcast(Self::scores_update(&room));
                self.arm_round_timeout(&room);
            }
            Advance::Finished { rankings } => {
                self.store.put(&self.key, &room).await?;
                tracing::info!(key = %self.key, "game ended");
                self.broadcast(ServerMessage::GameEnded {
                    scores: room.scores.clone(),
                    response_times: room.response_times.clone(),
                    rankings,
                });
            }
        }
        Ok(())
    }

    async fn handle_timeout(&self, generation: u64, question_index: usize) -> Result<()> {
        let mut room = self.load().await?;
        if room.generation != generation
            || room.status != RoomStatus::Active
            || room.current_question_index != question_index
        {
            // All-answered already advanced this round (or a reset
            // superseded it); the timer lost the race.
            return Ok(());
        }

        tracing::info!(key = %self.key, question = question_index, "round timed out");
        room.finish_round();
        self.store.put(&self.key, &room).await?;

        self.broadcast(Self::scores_update(&room));
        self.arm_advance(&room);
        Ok(())
    }
}
