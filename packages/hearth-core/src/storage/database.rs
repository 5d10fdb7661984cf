//! # Database
//!
//! SQLite wrapper holding messages and the user/listing read models.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │ MessageService  │                                                    │
//! │  └────────┬────────┘                                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                    │
//! │  │    Database     │  High-level API                                    │
//! │  │   (this file)   │  - Message rows                                    │
//! │  │                 │  - Read-state updates                              │
//! │  │                 │  - User / listing lookups                          │
//! │  └────────┬────────┘                                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                    │
//! │  │   SQLite DB     │  - In-memory for tests                             │
//! │  │                 │  - File for production                             │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call takes the connection lock for its whole duration, so each
//! operation is atomic with respect to the others.

use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::sync::Arc;

use super::schema;
use crate::directory::{Directory, ListingSummary, UserSummary};
use crate::error::{Error, Result};

/// Column list shared by every message query, in `row_to_message` order.
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, receiver_id, home_id, booking_id, \
     body, kind, file_url, file_name, file_size, mime_type, is_read, read_at, is_edited, \
     edited_at, reply_to, created_at, updated_at";

/// The main database handle
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::DatabaseError(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Database schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema is current (version {})", v);
            }
        }

        Ok(())
    }

    // ========================================================================
    // MESSAGE OPERATIONS
    // ========================================================================

    /// Insert a new message row
    pub fn store_message(&self, record: &MessageRecord) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            &format!(
                "INSERT INTO messages ({}) VALUES \
                 (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                MESSAGE_COLUMNS
            ),
            params![
                record.id,
                record.conversation_id,
                record.sender_id,
                record.receiver_id,
                record.home_id,
                record.booking_id,
                record.body,
                record.kind,
                record.file_url,
                record.file_name,
                record.file_size,
                record.mime_type,
                record.is_read,
                record.read_at,
                record.is_edited,
                record.edited_at,
                record.reply_to,
                record.created_at,
                record.updated_at,
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to store message: {}", e)))?;

        Ok(())
    }

    /// Get a single message by ID
    pub fn get_message(&self, id: &str) -> Result<Option<MessageRecord>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            &format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS),
            params![id],
            row_to_message,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get message: {}", e))),
        }
    }

    /// Get the full history of a conversation, oldest first
    pub fn get_conversation_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM messages WHERE conversation_id = ?
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            ))
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![conversation_id], row_to_message)
            .map_err(|e| Error::DatabaseError(format!("Failed to query messages: {}", e)))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(
                row.map_err(|e| Error::DatabaseError(format!("Failed to read message: {}", e)))?,
            );
        }

        Ok(messages)
    }

    /// Sender and receiver of the first message in a conversation, if any
    pub fn conversation_participants(&self, conversation_id: &str) -> Result<Option<(String, String)>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT sender_id, receiver_id FROM messages WHERE conversation_id = ?
             ORDER BY created_at ASC, rowid ASC LIMIT 1",
            params![conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );

        match result {
            Ok(pair) => Ok(Some(pair)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!(
                "Failed to get conversation participants: {}",
                e
            ))),
        }
    }

    /// Get every message a user sent or received, newest first
    pub fn get_messages_for_user(&self, user_id: &str) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM messages WHERE sender_id = ?1 OR receiver_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
                MESSAGE_COLUMNS
            ))
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user_id], row_to_message)
            .map_err(|e| Error::DatabaseError(format!("Failed to query messages: {}", e)))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(
                row.map_err(|e| Error::DatabaseError(format!("Failed to read message: {}", e)))?,
            );
        }

        Ok(messages)
    }

    /// Mark every unread message addressed to `receiver_id` in a conversation as read
    ///
    /// Only touches rows with `is_read = 0`, so read state never moves backwards
    /// and `read_at` keeps its first value.
    pub fn mark_conversation_read(
        &self,
        conversation_id: &str,
        receiver_id: &str,
        read_at: i64,
    ) -> Result<usize> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                "UPDATE messages SET is_read = 1, read_at = ?, updated_at = ?
                 WHERE conversation_id = ? AND receiver_id = ? AND is_read = 0",
                params![read_at, read_at, conversation_id, receiver_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to mark messages read: {}", e)))?;

        Ok(count)
    }

    /// Replace a message body and flag it as edited
    pub fn edit_message(&self, id: &str, new_body: &str, edited_at: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE messages SET body = ?, is_edited = 1, edited_at = ?, updated_at = ?
                 WHERE id = ?",
                params![new_body, edited_at, edited_at, id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to edit message: {}", e)))?;

        Ok(rows > 0)
    }

    /// Permanently delete a message
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM messages WHERE id = ?", params![id])
            .map_err(|e| Error::DatabaseError(format!("Failed to delete message: {}", e)))?;

        Ok(rows > 0)
    }

    /// Total number of stored messages
    pub fn count_messages(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .map_err(|e| Error::DatabaseError(format!("Failed to count messages: {}", e)))
    }

    // ========================================================================
    // DIRECTORY OPERATIONS
    // ========================================================================

    /// Insert or replace a user profile row
    pub fn upsert_user(&self, user: &UserSummary) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, first_name, last_name, email) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email",
            params![user.id, user.first_name, user.last_name, user.email],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to upsert user: {}", e)))?;
        Ok(())
    }

    /// Get a user profile by ID
    pub fn get_user(&self, id: &str) -> Result<Option<UserSummary>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, first_name, last_name, email FROM users WHERE id = ?",
            params![id],
            |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    email: row.get(3)?,
                })
            },
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get user: {}", e))),
        }
    }

    /// Insert or replace a listing row
    pub fn upsert_listing(&self, listing: &ListingSummary) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO homes (id, owner_id, house_name, photo_url) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                house_name = excluded.house_name,
                photo_url = excluded.photo_url",
            params![listing.id, listing.owner_id, listing.house_name, listing.photo_url],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to upsert listing: {}", e)))?;
        Ok(())
    }

    /// Get a listing by ID
    pub fn get_listing(&self, id: &str) -> Result<Option<ListingSummary>> {
        let conn = self.conn.lock();

        let result = conn.query_row(
            "SELECT id, owner_id, house_name, photo_url FROM homes WHERE id = ?",
            params![id],
            |row| {
                Ok(ListingSummary {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    house_name: row.get(2)?,
                    photo_url: row.get(3)?,
                })
            },
        );

        match result {
            Ok(listing) => Ok(Some(listing)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::DatabaseError(format!("Failed to get listing: {}", e))),
        }
    }
}

impl Directory for Database {
    fn user(&self, id: &str) -> Result<Option<UserSummary>> {
        self.get_user(id)
    }

    fn listing(&self, id: &str) -> Result<Option<ListingSummary>> {
        self.get_listing(id)
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        home_id: row.get(4)?,
        booking_id: row.get(5)?,
        body: row.get(6)?,
        kind: row.get(7)?,
        file_url: row.get(8)?,
        file_name: row.get(9)?,
        file_size: row.get(10)?,
        mime_type: row.get(11)?,
        is_read: row.get(12)?,
        read_at: row.get(13)?,
        is_edited: row.get(14)?,
        edited_at: row.get(15)?,
        reply_to: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

// ============================================================================
// RECORD TYPES
// ============================================================================

/// A message row from the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Message ID (UUID)
    pub id: String,
    /// Derived conversation key
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Listing the conversation is about
    pub home_id: String,
    pub booking_id: Option<String>,
    /// Body text (original file name for attachments)
    pub body: String,
    /// Message kind as stored (`text`, `image`, ...)
    pub kind: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub is_read: bool,
    pub read_at: Option<i64>,
    pub is_edited: bool,
    pub edited_at: Option<i64>,
    pub reply_to: Option<String>,
    /// Creation time (Unix millis)
    pub created_at: i64,
    /// Last mutation time (Unix millis)
    pub updated_at: i64,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, conversation_id: &str, sender: &str, receiver: &str, at: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            home_id: "h1".to_string(),
            booking_id: None,
            body: format!("body {}", id),
            kind: "text".to_string(),
            file_url: None,
            file_name: None,
            file_size: None,
            mime_type: None,
            is_read: false,
            read_at: None,
            is_edited: false,
            edited_at: None,
            reply_to: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_database_creation() {
        let db = Database::open(None).await.unwrap();
        assert_eq!(db.count_messages().unwrap(), 0);
        assert!(db.get_message("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_file_database_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(Some(path)).await.unwrap();
            db.store_message(&record("m1", "u1_u2_h1", "u1", "u2", 1)).unwrap();
        }

        let db = Database::open(Some(path)).await.unwrap();
        assert_eq!(db.count_messages().unwrap(), 1);
        assert_eq!(db.get_message("m1").unwrap().unwrap().body, "body m1");
    }

    #[tokio::test]
    async fn test_store_and_get_message() {
        let db = Database::open(None).await.unwrap();
        let mut rec = record("m1", "u1_u2_h1", "u1", "u2", 1000);
        rec.booking_id = Some("b1".to_string());
        rec.reply_to = Some("m0".to_string());
        db.store_message(&rec).unwrap();

        let loaded = db.get_message("m1").unwrap().unwrap();
        assert_eq!(loaded, rec);
    }

    #[tokio::test]
    async fn test_history_is_chronological_with_insertion_tiebreak() {
        let db = Database::open(None).await.unwrap();
        db.store_message(&record("late", "c", "u1", "u2", 300)).unwrap();
        db.store_message(&record("early", "c", "u2", "u1", 100)).unwrap();
        db.store_message(&record("tie-a", "c", "u1", "u2", 200)).unwrap();
        db.store_message(&record("tie-b", "c", "u1", "u2", 200)).unwrap();
        db.store_message(&record("other", "d", "u1", "u2", 150)).unwrap();

        let ids: Vec<String> = db
            .get_conversation_messages("c")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["early", "tie-a", "tie-b", "late"]);
    }

    #[tokio::test]
    async fn test_conversation_participants() {
        let db = Database::open(None).await.unwrap();
        assert!(db.conversation_participants("c1").unwrap().is_none());

        db.store_message(&record("m1", "c1", "u1", "u2", 10)).unwrap();
        db.store_message(&record("m2", "c1", "u2", "u1", 20)).unwrap();
        assert_eq!(
            db.conversation_participants("c1").unwrap(),
            Some(("u1".to_string(), "u2".to_string()))
        );
    }

    #[tokio::test]
    async fn test_messages_for_user_newest_first() {
        let db = Database::open(None).await.unwrap();
        db.store_message(&record("a", "c1", "u1", "u2", 100)).unwrap();
        db.store_message(&record("b", "c2", "u3", "u1", 200)).unwrap();
        db.store_message(&record("c", "c3", "u3", "u4", 300)).unwrap();

        let ids: Vec<String> = db
            .get_messages_for_user("u1")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_mark_conversation_read_only_touches_receiver() {
        let db = Database::open(None).await.unwrap();
        db.store_message(&record("to-u2", "c", "u1", "u2", 100)).unwrap();
        db.store_message(&record("to-u1", "c", "u2", "u1", 200)).unwrap();

        assert_eq!(db.mark_conversation_read("c", "u2", 500).unwrap(), 1);
        let read = db.get_message("to-u2").unwrap().unwrap();
        assert!(read.is_read);
        assert_eq!(read.read_at, Some(500));
        assert!(!db.get_message("to-u1").unwrap().unwrap().is_read);

        // Already read rows keep their first read_at
        assert_eq!(db.mark_conversation_read("c", "u2", 900).unwrap(), 0);
        assert_eq!(db.get_message("to-u2").unwrap().unwrap().read_at, Some(500));
    }

    #[tokio::test]
    async fn test_edit_and_delete_message() {
        let db = Database::open(None).await.unwrap();
        db.store_message(&record("m1", "c", "u1", "u2", 100)).unwrap();

        assert!(db.edit_message("m1", "changed", 200).unwrap());
        let edited = db.get_message("m1").unwrap().unwrap();
        assert_eq!(edited.body, "changed");
        assert!(edited.is_edited);
        assert_eq!(edited.edited_at, Some(200));
        assert_eq!(edited.updated_at, 200);

        assert!(db.delete_message("m1").unwrap());
        assert!(db.get_message("m1").unwrap().is_none());
        assert!(!db.delete_message("m1").unwrap());
        assert!(!db.edit_message("m1", "again", 300).unwrap());
    }

    #[tokio::test]
    async fn test_directory_lookups() {
        let db = Database::open(None).await.unwrap();
        let user = UserSummary {
            id: "u1".into(),
            first_name: "Ada".into(),
            last_name: "Guest".into(),
            email: "ada@example.com".into(),
        };
        db.upsert_user(&user).unwrap();
        assert_eq!(db.user("u1").unwrap(), Some(user.clone()));

        let renamed = UserSummary {
            first_name: "Ada L.".into(),
            ..user
        };
        db.upsert_user(&renamed).unwrap();
        assert_eq!(db.get_user("u1").unwrap().unwrap().first_name, "Ada L.");

        let listing = ListingSummary {
            id: "h1".into(),
            owner_id: "u2".into(),
            house_name: "Cliff Cabin".into(),
            photo_url: None,
        };
        db.upsert_listing(&listing).unwrap();
        assert_eq!(db.listing("h1").unwrap(), Some(listing));
        assert!(db.listing("h2").unwrap().is_none());
    }
}
