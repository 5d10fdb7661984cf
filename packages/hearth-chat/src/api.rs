//! Messaging REST API handlers.
//!
//! Mounted under `/api/chat`:
//!
//! - `GET    /conversations`                 — Conversation summaries, newest first
//! - `GET    /conversation-details/:homeId`  — Canonical conversation with a listing's host
//! - `GET    /messages/:conversationId`      — History; marks the caller's unread as read
//! - `POST   /send`                          — Send a text or booking message
//! - `PUT    /messages/:messageId`           — Edit a message body
//! - `DELETE /messages/:messageId`           — Delete a message
//! - `POST   /mark-read`                     — Mark a conversation read
//!
//! `POST /send-file` lives in [`crate::attachment::api`].
//!
//! Every write is persisted before it is broadcast.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use hearth_core::{Error, MessageType, NewMessage};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

// ── Request Types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: Option<String>,
    pub home_id: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub booking_id: Option<String>,
    pub reply_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub conversation_id: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /api/chat/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let conversations = state
        .store(move |messages| messages.list_conversations(&user.user_id))
        .await?;
    Ok(Json(json!({ "conversations": conversations })))
}

/// GET /api/chat/conversation-details/:homeId
pub async fn conversation_details(
    State(state): State<AppState>,
    user: AuthUser,
    Path(home_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let details = state
        .store(move |messages| messages.conversation_details(&user.user_id, &home_id))
        .await?;
    Ok(Json(json!(details)))
}

/// GET /api/chat/messages/:conversationId
///
/// Returns the full history oldest first and marks every message addressed
/// to the caller as read. The room hears about it if anything changed.
pub async fn get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let reader_id = user.user_id.clone();
    let key = conversation_id.clone();
    let (history, marked) = state
        .store(move |messages| messages.open_conversation(&key, &reader_id))
        .await?;

    if marked > 0 {
        state.broadcast_read(&conversation_id, &user.user_id);
    }

    Ok(Json(json!({ "messages": history })))
}

/// POST /api/chat/send
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = body?;

    let kind = match req.kind.as_deref() {
        None | Some("") => MessageType::Text,
        Some(raw) => MessageType::parse(raw)
            .ok_or_else(|| Error::InvalidField(format!("Unknown message type '{}'", raw)))?,
    };

    let request = NewMessage {
        receiver_id: req.receiver_id.unwrap_or_default(),
        home_id: req.home_id.unwrap_or_default(),
        body: req.message.unwrap_or_default(),
        kind,
        booking_id: req.booking_id,
        reply_to: req.reply_to.filter(|r| !r.trim().is_empty()),
        attachment: None,
    };

    let view = state
        .store(move |messages| messages.send(&user.user_id, request))
        .await?;

    state.broadcast_new_message(&view);

    Ok((StatusCode::CREATED, Json(json!({ "message": view }))))
}

/// PUT /api/chat/messages/:messageId
pub async fn edit_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<String>,
    body: Result<Json<EditMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let new_body = req.message.unwrap_or_default();

    let view = state
        .store(move |messages| messages.edit(&user.user_id, &message_id, &new_body))
        .await?;

    state.broadcast_edit(&view);

    Ok(Json(json!({ "message": view })))
}

/// DELETE /api/chat/messages/:messageId
pub async fn delete_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .store(move |messages| messages.delete(&user.user_id, &message_id))
        .await?;

    state.broadcast_delete(&deleted.conversation_id, &deleted.id);

    Ok(Json(json!({ "message": "Message deleted" })))
}

/// POST /api/chat/mark-read
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<MarkReadRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let conversation_id = req
        .conversation_id
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| Error::MissingFields("Missing conversationId".to_string()))?;

    let reader_id = user.user_id.clone();
    let key = conversation_id.clone();
    let count = state
        .store(move |messages| messages.mark_read(&key, &reader_id))
        .await?;

    if count > 0 {
        state.broadcast_read(&conversation_id, &user.user_id);
    }

    Ok(Json(json!({ "message": "Messages marked as read", "count": count })))
}
