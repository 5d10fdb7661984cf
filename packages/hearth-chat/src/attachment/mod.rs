//! Attachment upload and serving.
//!
//! - `POST /api/chat/send-file` sends a file into a conversation
//! - `GET  /uploads/chat-files/:name` serves a stored file

pub mod api;
mod store;

pub use store::AttachmentStore;
