//! # Hearth Core
//!
//! Messaging core of the Hearth rental marketplace: guests and hosts talk
//! about a listing, optionally a booking, and share files.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        HEARTH CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────┐   ┌──────────────────────┐   ┌──────────────────┐     │
//! │  │ Conversation │   │      Messaging       │   │    Directory     │     │
//! │  │              │◄──│                      │──►│                  │     │
//! │  │ - resolve()  │   │ - MessageService     │   │ - users          │     │
//! │  │ - rooms      │   │ - attachment policy  │   │ - listings       │     │
//! │  └──────────────┘   └──────────┬───────────┘   └──────────────────┘     │
//! │                                │                                        │
//! │                                ▼                                        │
//! │                     ┌──────────────────────┐                            │
//! │                     │       Storage        │                            │
//! │                     │  SQLite (rusqlite)   │                            │
//! │                     └──────────────────────┘                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`conversation`] - Deterministic conversation keys
//! - [`messaging`] - Message store operations and attachment rules
//! - [`directory`] - User and listing lookups
//! - [`storage`] - SQLite persistence
//!
//! Transport (HTTP, WebSocket, authentication) lives in the `hearth-chat`
//! server crate.

pub mod conversation;
pub mod directory;
pub mod error;
pub mod messaging;
pub mod storage;
pub mod time;

pub use error::{Error, Result, StatusClass};
pub use messaging::{
    Attachment, AttachmentPolicy, ConversationDetails, ConversationSummary, Message,
    MessageService, MessageType, MessageView, NewMessage,
};
pub use storage::Database;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
