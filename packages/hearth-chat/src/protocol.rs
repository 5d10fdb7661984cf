//! Realtime gateway protocol definitions.
//!
//! JSON text frames of the form `{"event": "<name>", "data": <payload>}`.
//! Unit events (`ping`, `pong`) carry no `data`.

use hearth_core::MessageView;
use serde::{Deserialize, Serialize};

// ── Client → Server ───────────────────────────────────────────────────────────

/// Events sent from a client to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Present the bearer credential. Must be the first event.
    Authenticate { token: String },

    /// Subscribe this connection to a conversation room.
    JoinConversation(String),

    /// Unsubscribe this connection from a conversation room.
    LeaveConversation(String),

    /// Typing indicator, relayed to the other connections in the room.
    Typing {
        conversation_id: String,
        is_typing: bool,
    },

    /// Read receipt fast path, relayed to the other connections in the room.
    /// Durable read state is changed through the REST API.
    MarkRead { conversation_id: String },

    /// Keep-alive.
    Ping,
}

// ── Server → Client ───────────────────────────────────────────────────────────

/// Events sent from the gateway to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Credential accepted; the connection is in its personal room.
    Authenticated { user_id: String },

    /// Acknowledges `join_conversation`.
    Joined { conversation_id: String },

    /// Acknowledges `leave_conversation`.
    Left { conversation_id: String },

    /// A message was persisted in a room's conversation.
    NewMessage(Box<MessageView>),

    /// A message body was edited. `message` is the new body text.
    MessageEdited { message_id: String, message: String },

    /// A message was deleted.
    MessageDeleted { message_id: String },

    /// A participant read the conversation.
    MessagesRead {
        conversation_id: String,
        user_id: String,
    },

    /// A participant started or stopped typing.
    UserTyping {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },

    /// Out-of-room nudge delivered to a user's personal room.
    Notification {
        #[serde(rename = "type")]
        kind: NotificationKind,
        message: Box<MessageView>,
    },

    /// Keep-alive response.
    Pong,

    /// Error response.
    Error { message: String },
}

/// Reason a notification was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
}
