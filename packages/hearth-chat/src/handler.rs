//! WebSocket connection handler.
//!
//! Each connection moves through three states:
//!
//! 1. **Unauthenticated**: only `authenticate` and `ping` are accepted. A bad
//!    credential or any other event gets an `error` frame and the socket is
//!    closed.
//! 2. **Authenticated**: registered with the [`Gateway`](crate::gateway::Gateway)
//!    and placed in its personal room. Room joins, typing and read receipts
//!    are processed until the client goes away.
//! 3. **Closed**: every room membership of this connection is released.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use hearth_core::conversation::personal_room;
use hearth_core::Error as CoreError;
use tokio::sync::mpsc;

use crate::gateway::ConnectionId;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

/// Sent whenever the handshake fails.
const AUTH_ERROR: &str = "Authentication error";

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server message");
            None
        }
    }
}

/// Handle a single WebSocket connection for its whole lifetime.
pub async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // ── Step 1: Authenticate ──────────────────────────────────────────────

    let user_id = loop {
        let rejection = match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Authenticate { token }) => match state.verifier.verify(&token) {
                    Ok(user_id) => break user_id,
                    Err(e) => format!("token rejected: {}", e),
                },
                Ok(ClientMessage::Ping) => {
                    if let Some(pong) = encode(&ServerMessage::Pong) {
                        if ws_sender.send(pong).await.is_err() {
                            return;
                        }
                    }
                    continue;
                }
                Ok(_) => "event before authenticate".to_string(),
                Err(e) => format!("unparseable frame: {}", e),
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = ws_sender.send(Message::Pong(data)).await;
                continue;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                return; // Connection closed before authenticating
            }
            _ => continue,
        };

        tracing::warn!(reason = rejection.as_str(), "WebSocket authentication failed");
        let err = ServerMessage::Error {
            message: AUTH_ERROR.to_string(),
        };
        if let Some(frame) = encode(&err) {
            let _ = ws_sender.send(frame).await;
        }
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    };

    // ── Step 2: Acknowledge and Register ──────────────────────────────────

    let ack = ServerMessage::Authenticated {
        user_id: user_id.clone(),
    };
    if let Some(frame) = encode(&ack) {
        if ws_sender.send(frame).await.is_err() {
            return;
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn = state.gateway.connect(&user_id, tx);
    tracing::info!(user_id = user_id.as_str(), connection = %conn, "WebSocket authenticated");

    // ── Step 3: Spawn Sender Task ─────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = encode(&msg) else {
                continue;
            };
            if ws_sender.send(frame).await.is_err() {
                break; // Connection closed
            }
        }
    });

    // ── Step 4: Process Events ────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_client_message(&state, conn, &user_id, client_msg).await,
                Err(e) => {
                    tracing::warn!(
                        user_id = user_id.as_str(),
                        error = %e,
                        "Failed to parse client message"
                    );
                    state.gateway.send_to(
                        conn,
                        ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!(user_id = user_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(user_id = user_id.as_str(), error = %e, "WebSocket error");
                break;
            }
            _ => {} // Binary, Ping, Pong
        }
    }

    // ── Step 5: Cleanup ───────────────────────────────────────────────────

    state.gateway.disconnect(conn);
    sender_task.abort();
    tracing::info!(user_id = user_id.as_str(), connection = %conn, "WebSocket disconnected");
}

/// Personal rooms carry notifications; only their owner may be in one.
fn is_foreign_personal_room(room: &str, user_id: &str) -> bool {
    room.starts_with("user_") && room != personal_room(user_id)
}

/// Handle one event from an authenticated connection.
async fn handle_client_message(state: &AppState, conn: ConnectionId, user_id: &str, msg: ClientMessage) {
    let gateway = &state.gateway;
    let reply_error = |message: &str| {
        gateway.send_to(
            conn,
            ServerMessage::Error {
                message: message.to_string(),
            },
        );
    };

    match msg {
        ClientMessage::Authenticate { .. } => reply_error("Already authenticated"),

        ClientMessage::Ping => {
            gateway.send_to(conn, ServerMessage::Pong);
        }

        ClientMessage::JoinConversation(conversation_id) => {
            if conversation_id.trim().is_empty() {
                return reply_error("Missing conversationId");
            }
            if is_foreign_personal_room(&conversation_id, user_id) {
                return reply_error("Cannot join another user's room");
            }
            if conversation_id != personal_room(user_id) {
                let (room, caller) = (conversation_id.clone(), user_id.to_string());
                match state.store(move |messages| messages.can_follow(&room, &caller)).await {
                    Ok(true) => {}
                    Ok(false) => return reply_error(&CoreError::NotParticipant.to_string()),
                    Err(e) => {
                        tracing::error!(user_id, error = %e, "Participation check failed");
                        return reply_error("Server error");
                    }
                }
            }
            gateway.join(conn, &conversation_id);
            tracing::info!(user_id, conversation_id = conversation_id.as_str(), "Joined conversation");
            gateway.send_to(conn, ServerMessage::Joined { conversation_id });
        }

        ClientMessage::LeaveConversation(conversation_id) => {
            gateway.leave(conn, &conversation_id);
            tracing::info!(user_id, conversation_id = conversation_id.as_str(), "Left conversation");
            gateway.send_to(conn, ServerMessage::Left { conversation_id });
        }

        ClientMessage::Typing {
            conversation_id,
            is_typing,
        } => {
            if !gateway.is_member(conn, &conversation_id) {
                return reply_error("Join the conversation first");
            }
            gateway.emit_to_room(
                &conversation_id,
                ServerMessage::UserTyping {
                    conversation_id: conversation_id.clone(),
                    user_id: user_id.to_string(),
                    is_typing,
                },
                Some(conn),
            );
        }

        ClientMessage::MarkRead { conversation_id } => {
            if !gateway.is_member(conn, &conversation_id) {
                return reply_error("Join the conversation first");
            }
            gateway.emit_to_room(
                &conversation_id,
                ServerMessage::MessagesRead {
                    conversation_id: conversation_id.clone(),
                    user_id: user_id.to_string(),
                },
                Some(conn),
            );
        }
    }
}
