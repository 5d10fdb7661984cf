//! # Database Schema
//!
//! SQL schema definitions for the messaging database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │    messages     │    │     users       │      │     homes       │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ id              │    │ id              │      │ id              │    │
//! │  │ conversation_id │    │ first_name      │      │ owner_id        │    │
//! │  │ sender_id       │───►│ last_name       │◄─────│ house_name      │    │
//! │  │ receiver_id     │───►│ email           │      │ photo_url       │    │
//! │  │ home_id         │────┼─────────────────┼─────►│                 │    │
//! │  │ booking_id      │    └─────────────────┘      └─────────────────┘    │
//! │  │ body, kind      │                                                    │
//! │  │ file_*          │    users / homes are read models of records        │
//! │  │ is_read/read_at │    owned by the rest of the marketplace.           │
//! │  │ is_edited/..    │                                                    │
//! │  │ reply_to        │                                                    │
//! │  │ created_at      │                                                    │
//! │  │ updated_at      │                                                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no conversations table: a conversation is the set of messages
//! sharing `conversation_id`.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Messages table
-- One row per message; conversation_id is derived from
-- (sender_id, receiver_id, home_id) at creation time
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    home_id TEXT NOT NULL,
    booking_id TEXT,
    body TEXT NOT NULL,
    -- text | image | file | document | booking_request | booking_confirmation
    kind TEXT NOT NULL DEFAULT 'text',
    -- Attachment fields, only set for image | file | document
    file_url TEXT,
    file_name TEXT,
    file_size INTEGER,
    mime_type TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    read_at INTEGER,
    is_edited INTEGER NOT NULL DEFAULT 0,
    edited_at INTEGER,
    reply_to TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_receiver_unread ON messages(receiver_id, is_read);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);

-- Users read model
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL
);

-- Listings read model
CREATE TABLE IF NOT EXISTS homes (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    house_name TEXT NOT NULL,
    photo_url TEXT
);
"#;
