//! WebSocket endpoint and command dispatch.
//!
//! Each connection gets a ulid identity; that is the player id used by
//! join/submit unless a reconnecting client asks for its prior one. The
//! socket writer runs as its own task fed by an mpsc channel, with
//! forwarder tasks pumping the global broadcast and (after a join) the
//! room broadcast into it.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::GameError;
use crate::loader;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::registry::RoomRegistry;
use crate::types::*;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request: role={:?}", params.role);
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

fn resolve_role(params: &WsQuery, config: &Config) -> Role {
    if params.role.as_deref() != Some("admin") {
        return Role::Player;
    }
    match &config.admin_token {
        None => Role::Admin,
        Some(expected) if params.token.as_deref() == Some(expected.as_str()) => Role::Admin,
        Some(_) => {
            tracing::warn!("admin role claimed with missing or wrong token, downgrading");
            Role::Player
        }
    }
}

/// The room a connection has joined, and the identity it joined under.
struct JoinedRoom {
    room_id: RoomId,
    player_id: PlayerId,
    forwarder: JoinHandle<()>,
}

async fn handle_socket(socket: WebSocket, params: WsQuery, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let conn_id: PlayerId = ulid::Ulid::new().to_string();
    let role = resolve_role(&params, &state.config);

    tracing::info!(conn = %conn_id, ?role, "WebSocket connected");

    let (out_tx, out_rx) = mpsc::channel::<Message>(64);
    let writer = tokio::spawn(write_loop(sender, out_rx));
    let global_forwarder = spawn_forwarder(state.registry.subscribe_global(), out_tx.clone());

    // Push the current game id right away so clients can join without
    // asking (the id is also available via requestGameId).
    if let Some(game_id) = state.registry.current_game_id().await {
        send_event(&out_tx, &ServerMessage::GameId { game_id }).await;
    }

    let mut joined: Option<JoinedRoom> = None;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                tracing::debug!(conn = %conn_id, "received: {}", text);
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        handle_client_message(
                            client_msg, role, &conn_id, &state, &out_tx, &mut joined,
                        )
                        .await;
                    }
                    Err(e) => {
                        tracing::error!(conn = %conn_id, "failed to parse client message: {e}");
                        send_event(
                            &out_tx,
                            &ServerMessage::Error {
                                message: format!("Invalid message format: {e}"),
                            },
                        )
                        .await;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn = %conn_id, "WebSocket closed");
                break;
            }
            Ok(Message::Ping(data)) => {
                if out_tx.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(conn = %conn_id, "WebSocket error: {e}");
                break;
            }
        }
    }

    // Synthesize the disconnect for whatever room this connection was in.
    if let Some(room) = joined.take() {
        if let Ok(handle) = state.registry.handle(&room.room_id).await {
            handle.disconnect(room.player_id).await;
        }
        room.forwarder.abort();
    }
    global_forwarder.abort();
    writer.abort();
    tracing::info!(conn = %conn_id, "connection cleaned up");
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = out_rx.recv().await {
        if sender.send(msg).await.is_err() {
            break;
        }
    }
}

/// Pump a broadcast subscription into the connection's outbound queue.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<ServerMessage>,
    out_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    let Ok(json) = serde_json::to_string(&msg) else {
                        continue;
                    };
                    if out_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Slow consumer; resync happens via requestSnapshot.
                    tracing::warn!(skipped, "connection lagged behind broadcasts");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn send_event(out_tx: &mpsc::Sender<Message>, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let _ = out_tx.send(Message::Text(json.into())).await;
    }
}

async fn handle_client_message(
    msg: ClientMessage,
    role: Role,
    conn_id: &PlayerId,
    state: &AppState,
    out_tx: &mpsc::Sender<Message>,
    joined: &mut Option<JoinedRoom>,
) {
    match msg {
        ClientMessage::CreateGame { questions, room_id } => {
            match state
                .registry
                .create_room(questions, room_id, Some(conn_id.clone()))
                .await
            {
                Ok(game_id) => {
                    // The creator is the host; it follows the room's
                    // events even before joining as a player.
                    if let Ok(handle) = state.registry.handle(&game_id).await {
                        replace_room_subscription(
                            joined,
                            JoinedRoom {
                                room_id: game_id.clone(),
                                player_id: conn_id.clone(),
                                forwarder: spawn_forwarder(handle.subscribe(), out_tx.clone()),
                            },
                        );
                    }
                    send_event(out_tx, &ServerMessage::GameCreated { game_id }).await;
                }
                Err(e) => send_error(out_tx, e).await,
            }
        }

        ClientMessage::JoinGame {
            game_id,
            player_name,
            player_id,
        } => {
            let handle = match state.registry.handle(&game_id).await {
                Ok(h) => h,
                Err(e) => return send_error(out_tx, e).await,
            };
            // A reconnecting client may present its prior identity to
            // rebind; otherwise the connection id is the player id.
            let pid = player_id.unwrap_or_else(|| conn_id.clone());

            // Subscribe before joining so this connection also sees its
            // own playerJoined broadcast.
            let forwarder = spawn_forwarder(handle.subscribe(), out_tx.clone());
            match handle.join(pid.clone(), player_name).await {
                Ok(direct) => {
                    replace_room_subscription(
                        joined,
                        JoinedRoom {
                            room_id: normalize_room_id(&game_id),
                            player_id: pid,
                            forwarder,
                        },
                    );
                    for event in &direct {
                        send_event(out_tx, event).await;
                    }
                }
                Err(e) => {
                    forwarder.abort();
                    send_error(out_tx, e).await;
                }
            }
        }

        ClientMessage::StartGame { game_id } => {
            let requester = joined
                .as_ref()
                .map(|j| j.player_id.clone())
                .unwrap_or_else(|| conn_id.clone());
            match state.registry.handle(&game_id).await {
                Ok(handle) => {
                    if let Err(e) = handle.start(Some(requester)).await {
                        send_error(out_tx, e).await;
                    }
                }
                Err(e) => send_error(out_tx, e).await,
            }
        }

        ClientMessage::SubmitAnswer {
            game_id,
            answer,
            time_left,
        } => {
            let pid = joined
                .as_ref()
                .map(|j| j.player_id.clone())
                .unwrap_or_else(|| conn_id.clone());
            match state.registry.handle(&game_id).await {
                Ok(handle) => {
                    if let Err(e) = handle.submit_answer(pid, answer, time_left).await {
                        send_error(out_tx, e).await;
                    }
                }
                Err(e) => send_error(out_tx, e).await,
            }
        }

        ClientMessage::RequestGameId => match state.registry.current_game_id().await {
            Some(game_id) => send_event(out_tx, &ServerMessage::GameId { game_id }).await,
            None => {
                send_event(
                    out_tx,
                    &ServerMessage::Error {
                        message: "No game available".to_string(),
                    },
                )
                .await
            }
        },

        ClientMessage::RequestSnapshot { game_id } => {
            match state.registry.handle(&game_id).await {
                Ok(handle) => match handle.snapshot().await {
                    Ok(snapshot) => send_event(out_tx, &snapshot).await,
                    Err(e) => send_error(out_tx, e).await,
                },
                Err(e) => send_error(out_tx, e).await,
            }
        }

        ClientMessage::AdminClearAll => {
            if role != Role::Admin {
                return send_admin_error(out_tx, "Only an admin can reset the game").await;
            }
            tracing::info!(conn = %conn_id, "admin requested full reset");
            let quiz = match loader::load_quiz_file(&state.config.quiz_path).await {
                Ok(q) => q,
                Err(e) => return send_admin_error(out_tx, &e.to_string()).await,
            };
            match state.registry.admin_reset(&quiz).await {
                Ok(_) => {
                    send_event(
                        out_tx,
                        &ServerMessage::AdminSuccess {
                            message: "Game reset successfully".to_string(),
                        },
                    )
                    .await
                }
                Err(e) => send_admin_error(out_tx, &e.to_string()).await,
            }
        }

        ClientMessage::AdminStartGame => {
            if role != Role::Admin {
                return send_admin_error(out_tx, "Only an admin can start the game").await;
            }
            let Some(game_id) = state.registry.current_game_id().await else {
                return send_admin_error(out_tx, "No game is currently loaded").await;
            };
            let result = match state.registry.handle(&game_id).await {
                Ok(handle) => handle.start(None).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    send_event(
                        out_tx,
                        &ServerMessage::AdminSuccess {
                            message: "Game started successfully".to_string(),
                        },
                    )
                    .await
                }
                Err(e) => send_admin_error(out_tx, &e.to_string()).await,
            }
        }

        ClientMessage::PlayerDisconnected { game_id } => {
            let pid = joined
                .as_ref()
                .map(|j| j.player_id.clone())
                .unwrap_or_else(|| conn_id.clone());
            if let Ok(handle) = state.registry.handle(&game_id).await {
                handle.disconnect(pid).await;
            }
        }
    }
}

fn replace_room_subscription(joined: &mut Option<JoinedRoom>, next: JoinedRoom) {
    if let Some(previous) = joined.replace(next) {
        previous.forwarder.abort();
    }
}

async fn send_error(out_tx: &mpsc::Sender<Message>, err: GameError) {
    tracing::debug!("command failed: {err}");
    send_event(
        out_tx,
        &ServerMessage::Error {
            message: err.to_string(),
        },
    )
    .await;
}

async fn send_admin_error(out_tx: &mpsc::Sender<Message>, message: &str) {
    send_event(
        out_tx,
        &ServerMessage::AdminError {
            message: message.to_string(),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_resolution_without_token_requirement() {
        let config = Config::default();
        let admin = WsQuery {
            role: Some("admin".to_string()),
            token: None,
        };
        let player = WsQuery {
            role: None,
            token: None,
        };
        assert_eq!(resolve_role(&admin, &config), Role::Admin);
        assert_eq!(resolve_role(&player, &config), Role::Player);
    }

    #[test]
    fn test_admin_role_requires_matching_token() {
        let config = Config {
            admin_token: Some("hunter2".to_string()),
            ..Config::default()
        };
        let good = WsQuery {
            role: Some("admin".to_string()),
            token: Some("hunter2".to_string()),
        };
        let bad = WsQuery {
            role: Some("admin".to_string()),
            token: Some("wrong".to_string()),
        };
        let missing = WsQuery {
            role: Some("admin".to_string()),
            token: None,
        };
        assert_eq!(resolve_role(&good, &config), Role::Admin);
        assert_eq!(resolve_role(&bad, &config), Role::Player);
        assert_eq!(resolve_role(&missing, &config), Role::Player);
    }
}
