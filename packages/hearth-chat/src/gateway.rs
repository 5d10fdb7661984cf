//! Realtime gateway room table.
//!
//! The gateway exclusively owns two maps:
//!
//! - connection id → (user id, outbound channel, joined rooms)
//! - room key → (connection id → outbound channel)
//!
//! Room keys are conversation keys or personal rooms (`user_<id>`). Nothing
//! outside this module touches either map; joins, leaves and broadcasts all go
//! through [`Gateway`] methods.
//!
//! Emission to a room holds that room's entry exclusively while it pushes the
//! event into every member's channel, so every member sees the events of one
//! room in the same order. Channels are unbounded, so a slow client never
//! blocks an emitter. Single-process only: a multi-node deployment would need an
//! external broker in front of [`Gateway::emit_to_room`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use hearth_core::conversation::personal_room;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Identifies one WebSocket connection. A user may hold several.
pub type ConnectionId = Uuid;

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

struct ConnectionEntry {
    user_id: String,
    sender: ClientSender,
    rooms: HashSet<String>,
}

/// Room membership and fan-out for authenticated connections.
#[derive(Clone, Default)]
pub struct Gateway {
    connections: Arc<DashMap<ConnectionId, ConnectionEntry>>,
    rooms: Arc<DashMap<String, HashMap<ConnectionId, ClientSender>>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Connection Management ─────────────────────────────────────────────

    /// Register an authenticated connection and place it in its personal room.
    pub fn connect(&self, user_id: &str, sender: ClientSender) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            ConnectionEntry {
                user_id: user_id.to_string(),
                sender,
                rooms: HashSet::new(),
            },
        );
        self.join(id, &personal_room(user_id));
        tracing::info!(user_id, connection = %id, "Connection registered");
        id
    }

    /// Drop a connection and release every room it was in.
    pub fn disconnect(&self, id: ConnectionId) {
        let Some((_, entry)) = self.connections.remove(&id) else {
            return;
        };
        for room in &entry.rooms {
            self.remove_member(room, id);
        }
        tracing::info!(
            user_id = entry.user_id.as_str(),
            connection = %id,
            rooms = entry.rooms.len(),
            "Connection unregistered"
        );
    }

    /// User behind a connection.
    pub fn user_of(&self, id: ConnectionId) -> Option<String> {
        self.connections.get(&id).map(|c| c.user_id.clone())
    }

    /// Send directly to one connection. Returns true if it was queued.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(&id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    // ── Room Membership ───────────────────────────────────────────────────

    /// Add a connection to a room. Returns false if the connection is unknown.
    pub fn join(&self, id: ConnectionId, room: &str) -> bool {
        let sender = match self.connections.get_mut(&id) {
            Some(mut conn) => {
                conn.rooms.insert(room.to_string());
                conn.sender.clone()
            }
            None => return false,
        };
        // Never hold a connection entry and a room entry at the same time.
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(id, sender);
        tracing::debug!(connection = %id, room, "Joined room");
        true
    }

    /// Remove a connection from a room. Returns true if it was a member.
    pub fn leave(&self, id: ConnectionId, room: &str) -> bool {
        let was_member = match self.connections.get_mut(&id) {
            Some(mut conn) => conn.rooms.remove(room),
            None => false,
        };
        if was_member {
            self.remove_member(room, id);
            tracing::debug!(connection = %id, room, "Left room");
        }
        was_member
    }

    /// Whether a connection is currently in a room.
    pub fn is_member(&self, id: ConnectionId, room: &str) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains_key(&id))
            .unwrap_or(false)
    }

    fn remove_member(&self, room: &str, id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    // ── Fan-out ───────────────────────────────────────────────────────────

    /// Emit an event to every connection in a room, optionally skipping one.
    ///
    /// Returns how many connections the event was queued for. Closed channels
    /// are skipped; their connections are cleaned up on disconnect.
    pub fn emit_to_room(
        &self,
        room: &str,
        message: ServerMessage,
        except: Option<ConnectionId>,
    ) -> usize {
        let Some(members) = self.rooms.get_mut(room) else {
            return 0;
        };
        let mut delivered = 0;
        for (id, sender) in members.iter() {
            if Some(*id) == except {
                continue;
            }
            if sender.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Emit an event to every connection of a user.
    pub fn notify_user(&self, user_id: &str, message: ServerMessage) -> usize {
        self.emit_to_room(&personal_room(user_id), message, None)
    }

    // ── Stats ─────────────────────────────────────────────────────────────

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of non-empty rooms, personal rooms included.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
