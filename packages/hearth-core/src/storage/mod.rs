//! # Storage Module
//!
//! SQLite persistence for messages plus the user and listing read models.
//!
//! The Message Store is the only writer of message rows. The realtime layer
//! never touches this module directly.

mod database;
mod schema;

pub use database::{Database, MessageRecord};
pub use schema::SCHEMA_VERSION;
