//! # Messaging Module
//!
//! Host/guest messages scoped to a listing.
//!
//! ## Message Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MESSAGE LIFECYCLE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   send / send_attachment                                                │
//! │   ──────────────────────                                                │
//! │   validate fields ─► conversation::resolve(sender, receiver, home)      │
//! │                   ─► INSERT (is_read = false)                           │
//! │                   ─► MessageView (sender / receiver / home resolved)    │
//! │                                                                         │
//! │   open_conversation / mark_read      (receiver only)                    │
//! │   ───────────────────────────────                                       │
//! │   is_read: false ──────────────────► true   (never back)                │
//! │                                                                         │
//! │   edit    (sender only) ─► body replaced, is_edited = true              │
//! │   delete  (sender only) ─► row removed, no tombstone                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Conversations are not stored. [`MessageService::list_conversations`]
//! groups the caller's messages by conversation key on every call.

pub mod attachment;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation;
use crate::directory::{Directory, ListingSummary, UserSummary};
use crate::error::{Error, Result};
use crate::storage::{Database, MessageRecord};

pub use attachment::{Attachment, AttachmentPolicy};

/// Kind of a message, decided once at send time and stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text
    #[default]
    Text,
    /// Image attachment
    Image,
    /// Generic file attachment
    File,
    /// PDF attachment
    Document,
    /// Guest asks the host to confirm a booking
    BookingRequest,
    /// Host confirms a booking
    BookingConfirmation,
}

impl MessageType {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Document => "document",
            Self::BookingRequest => "booking_request",
            Self::BookingConfirmation => "booking_confirmation",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "document" => Some(Self::Document),
            "booking_request" => Some(Self::BookingRequest),
            "booking_confirmation" => Some(Self::BookingConfirmation),
            _ => None,
        }
    }

    /// Whether messages of this kind carry file fields
    pub fn is_attachment(&self) -> bool {
        matches!(self, Self::Image | Self::File | Self::Document)
    }
}

/// A persisted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID (UUID)
    pub id: String,
    /// Conversation key, see [`conversation::resolve`]
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub home_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    /// Body text; the original file name for attachments
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// File fields, present exactly when `kind` is an attachment kind
    #[serde(flatten)]
    pub attachment: Option<Attachment>,
    pub is_read: bool,
    pub read_at: Option<i64>,
    pub is_edited: bool,
    pub edited_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds
    pub updated_at: i64,
}

impl Message {
    /// Build from a database row
    pub fn from_record(record: MessageRecord) -> Result<Self> {
        let kind = MessageType::parse(&record.kind).ok_or_else(|| {
            Error::DatabaseError(format!(
                "Unknown message kind '{}' on message {}",
                record.kind, record.id
            ))
        })?;

        let attachment = match (kind.is_attachment(), record.file_url) {
            (true, Some(file_url)) => Some(Attachment {
                file_url,
                file_name: record.file_name.unwrap_or_else(|| record.body.clone()),
                file_size: record.file_size.unwrap_or_default(),
                mime_type: record.mime_type.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            home_id: record.home_id,
            booking_id: record.booking_id,
            message: record.body,
            kind,
            attachment,
            is_read: record.is_read,
            read_at: record.read_at,
            is_edited: record.is_edited,
            edited_at: record.edited_at,
            reply_to: record.reply_to,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Convert to a database row
    pub fn to_record(&self) -> MessageRecord {
        let file = self.attachment.as_ref();
        MessageRecord {
            id: self.id.clone(),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            home_id: self.home_id.clone(),
            booking_id: self.booking_id.clone(),
            body: self.message.clone(),
            kind: self.kind.as_str().to_string(),
            file_url: file.map(|a| a.file_url.clone()),
            file_name: file.map(|a| a.file_name.clone()),
            file_size: file.map(|a| a.file_size),
            mime_type: file.map(|a| a.mime_type.clone()),
            is_read: self.is_read,
            read_at: self.read_at,
            is_edited: self.is_edited,
            edited_at: self.edited_at,
            reply_to: self.reply_to.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A message with its participants and listing resolved for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<ListingSummary>,
}

/// One row of a user's inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub other_user_id: String,
    pub other_user: Option<UserSummary>,
    pub home_id: String,
    pub home: Option<ListingSummary>,
    /// Body of the most recent message
    pub last_message: String,
    pub last_message_type: MessageType,
    pub last_message_time: i64,
    /// Messages addressed to the caller that are still unread
    pub unread_count: u32,
}

/// Canonical conversation between a guest and a listing's host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetails {
    pub conversation_id: String,
    pub host_id: String,
    pub host: Option<UserSummary>,
    pub home: ListingSummary,
}

/// Input for [`MessageService::send`]
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub receiver_id: String,
    pub home_id: String,
    pub body: String,
    pub kind: MessageType,
    pub booking_id: Option<String>,
    pub reply_to: Option<String>,
    pub attachment: Option<Attachment>,
}

/// Message Store operations over a [`Database`]
#[derive(Clone)]
pub struct MessageService {
    database: Arc<Database>,
    directory: Arc<dyn Directory>,
    clock: Arc<AtomicI64>,
}

impl MessageService {
    /// Create a service that resolves users and listings from the same database
    pub fn new(database: Arc<Database>) -> Self {
        let directory: Arc<dyn Directory> = database.clone();
        Self::with_directory(database, directory)
    }

    /// Create a service with a separate directory source
    pub fn with_directory(database: Arc<Database>, directory: Arc<dyn Directory>) -> Self {
        Self {
            database,
            directory,
            clock: Arc::new(AtomicI64::new(0)),
        }
    }

    /// The underlying database
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Strictly increasing creation timestamp (Unix millis)
    fn next_timestamp(&self) -> i64 {
        let now = crate::time::now_timestamp_millis();
        let prev = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// One summary per conversation the user takes part in, newest first
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let records = self.database.get_messages_for_user(user_id)?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (MessageRecord, u32)> = HashMap::new();

        // Rows arrive newest first, so the first row seen per key is the latest.
        for record in records {
            let unread = u32::from(record.receiver_id == user_id && !record.is_read);
            match groups.get_mut(&record.conversation_id) {
                Some((_, count)) => *count += unread,
                None => {
                    order.push(record.conversation_id.clone());
                    groups.insert(record.conversation_id.clone(), (record, unread));
                }
            }
        }

        let mut lookups = Lookups::new(self.directory.as_ref());
        let mut summaries = Vec::with_capacity(order.len());
        for key in order {
            let Some((latest, unread_count)) = groups.remove(&key) else {
                continue;
            };
            let other_user_id =
                conversation::other_participant(user_id, &latest.sender_id, &latest.receiver_id)
                    .to_string();
            let kind = MessageType::parse(&latest.kind).unwrap_or_default();
            summaries.push(ConversationSummary {
                conversation_id: key,
                other_user: lookups.user(&other_user_id)?,
                other_user_id,
                home: lookups.listing(&latest.home_id)?,
                home_id: latest.home_id,
                last_message: latest.body,
                last_message_type: kind,
                last_message_time: latest.created_at,
                unread_count,
            });
        }

        Ok(summaries)
    }

    /// Full history of a conversation, oldest first
    ///
    /// Fails with [`Error::NotParticipant`] when the conversation has messages
    /// and the caller is not one of its two users.
    pub fn history(&self, conversation_id: &str, caller_id: &str) -> Result<Vec<MessageView>> {
        let records = self.database.get_conversation_messages(conversation_id)?;
        if let Some(first) = records.first() {
            if first.sender_id != caller_id && first.receiver_id != caller_id {
                return Err(Error::NotParticipant);
            }
        }
        self.enrich_all(records)
    }

    /// Whether a user may follow a conversation live
    ///
    /// Once a conversation has messages only its two users qualify, the same
    /// rule [`history`](Self::history) applies. Before the first message the
    /// key itself must name the user.
    pub fn can_follow(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        match self.database.conversation_participants(conversation_id)? {
            Some((sender, receiver)) => Ok(sender == user_id || receiver == user_id),
            None => Ok(conversation::names_participant(conversation_id, user_id)),
        }
    }

    /// Fetch history and mark everything addressed to the caller as read
    ///
    /// Returns the history as persisted after the update, plus how many
    /// messages changed state.
    pub fn open_conversation(
        &self,
        conversation_id: &str,
        caller_id: &str,
    ) -> Result<(Vec<MessageView>, usize)> {
        // Authorize before mutating anything.
        self.history(conversation_id, caller_id)?;
        let marked = self.mark_read(conversation_id, caller_id)?;
        let messages = self.history(conversation_id, caller_id)?;
        Ok((messages, marked))
    }

    /// Canonical conversation between the caller and a listing's host
    pub fn conversation_details(
        &self,
        caller_id: &str,
        listing_id: &str,
    ) -> Result<ConversationDetails> {
        let home = self
            .directory
            .listing(listing_id)?
            .ok_or(Error::ListingNotFound)?;

        if home.owner_id == caller_id {
            return Err(Error::CannotMessageSelf);
        }

        Ok(ConversationDetails {
            conversation_id: conversation::resolve(caller_id, &home.owner_id, &home.id),
            host: self.directory.user(&home.owner_id)?,
            host_id: home.owner_id.clone(),
            home,
        })
    }

    // ── Writes ───────────────────────────────────────────────────────────

    /// Mark unread messages addressed to `reader_id` as read
    pub fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<usize> {
        let now = crate::time::now_timestamp_millis();
        let count = self
            .database
            .mark_conversation_read(conversation_id, reader_id, now)?;

        if count > 0 {
            tracing::debug!(
                conversation_id,
                reader_id,
                count,
                "Messages marked as read"
            );
        }

        Ok(count)
    }

    /// Validate and persist a new message
    pub fn send(&self, sender_id: &str, request: NewMessage) -> Result<MessageView> {
        let NewMessage {
            receiver_id,
            home_id,
            body,
            kind,
            booking_id,
            reply_to,
            attachment,
        } = request;

        if receiver_id.trim().is_empty() || home_id.trim().is_empty() || body.trim().is_empty() {
            return Err(Error::MissingFields("Missing required fields".to_string()));
        }
        if sender_id == receiver_id {
            return Err(Error::CannotMessageSelf);
        }
        if kind.is_attachment() != attachment.is_some() {
            return Err(Error::InvalidField(format!(
                "Message type '{}' must be sent as a file upload",
                kind.as_str()
            )));
        }

        let conversation_id = conversation::resolve(sender_id, &receiver_id, &home_id);

        if let Some(ref target) = reply_to {
            let parent = self.database.get_message(target)?;
            if parent.map(|p| p.conversation_id) != Some(conversation_id.clone()) {
                return Err(Error::InvalidField(
                    "Reply target is not part of this conversation".to_string(),
                ));
            }
        }

        let now = self.next_timestamp();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            sender_id: sender_id.to_string(),
            receiver_id,
            home_id,
            booking_id: booking_id.filter(|b| !b.trim().is_empty()),
            message: body,
            kind,
            attachment,
            is_read: false,
            read_at: None,
            is_edited: false,
            edited_at: None,
            reply_to,
            created_at: now,
            updated_at: now,
        };

        self.database.store_message(&message.to_record())?;

        tracing::info!(
            message_id = message.id.as_str(),
            conversation_id = message.conversation_id.as_str(),
            kind = message.kind.as_str(),
            "Message stored"
        );

        self.enrich(message)
    }

    /// Persist a message carrying an already stored attachment
    ///
    /// The body is the original file name and the kind follows the MIME type.
    pub fn send_attachment(
        &self,
        sender_id: &str,
        receiver_id: &str,
        home_id: &str,
        booking_id: Option<String>,
        attachment: Attachment,
    ) -> Result<MessageView> {
        if receiver_id.trim().is_empty() || home_id.trim().is_empty() {
            return Err(Error::MissingFields("Missing receiverId or homeId".to_string()));
        }

        self.send(
            sender_id,
            NewMessage {
                receiver_id: receiver_id.to_string(),
                home_id: home_id.to_string(),
                body: attachment.file_name.clone(),
                kind: attachment::classify(&attachment.mime_type),
                booking_id,
                reply_to: None,
                attachment: Some(attachment),
            },
        )
    }

    /// Replace the body of a message the caller sent
    pub fn edit(&self, caller_id: &str, message_id: &str, new_body: &str) -> Result<MessageView> {
        if new_body.trim().is_empty() {
            return Err(Error::MissingFields("Message text is required".to_string()));
        }

        let record = self
            .database
            .get_message(message_id)?
            .ok_or(Error::MessageNotFound)?;
        if record.sender_id != caller_id {
            return Err(Error::NotAuthorized("edit"));
        }

        let now = crate::time::now_timestamp_millis();
        if !self.database.edit_message(message_id, new_body, now)? {
            // Deleted between the read and the write.
            return Err(Error::MessageNotFound);
        }

        let updated = self
            .database
            .get_message(message_id)?
            .ok_or(Error::MessageNotFound)?;

        tracing::info!(message_id, "Message edited");

        self.enrich(Message::from_record(updated)?)
    }

    /// Permanently delete a message the caller sent
    ///
    /// Returns the removed message so the caller can notify its room.
    pub fn delete(&self, caller_id: &str, message_id: &str) -> Result<Message> {
        let record = self
            .database
            .get_message(message_id)?
            .ok_or(Error::MessageNotFound)?;
        if record.sender_id != caller_id {
            return Err(Error::NotAuthorized("delete"));
        }

        if !self.database.delete_message(message_id)? {
            return Err(Error::MessageNotFound);
        }

        tracing::info!(message_id, "Message deleted");

        Message::from_record(record)
    }

    // ── Enrichment ───────────────────────────────────────────────────────

    fn enrich(&self, message: Message) -> Result<MessageView> {
        Lookups::new(self.directory.as_ref()).view(message)
    }

    fn enrich_all(&self, records: Vec<MessageRecord>) -> Result<Vec<MessageView>> {
        let mut lookups = Lookups::new(self.directory.as_ref());
        records
            .into_iter()
            .map(|record| lookups.view(Message::from_record(record)?))
            .collect()
    }
}

/// Per-call memo of directory lookups, so a long history resolves each user once.
struct Lookups<'a> {
    directory: &'a dyn Directory,
    users: HashMap<String, Option<UserSummary>>,
    listings: HashMap<String, Option<ListingSummary>>,
}

impl<'a> Lookups<'a> {
    fn new(directory: &'a dyn Directory) -> Self {
        Self {
            directory,
            users: HashMap::new(),
            listings: HashMap::new(),
        }
    }

    fn user(&mut self, id: &str) -> Result<Option<UserSummary>> {
        if let Some(cached) = self.users.get(id) {
            return Ok(cached.clone());
        }
        let user = self.directory.user(id)?;
        self.users.insert(id.to_string(), user.clone());
        Ok(user)
    }

    fn listing(&mut self, id: &str) -> Result<Option<ListingSummary>> {
        if let Some(cached) = self.listings.get(id) {
            return Ok(cached.clone());
        }
        let listing = self.directory.listing(id)?;
        self.listings.insert(id.to_string(), listing.clone());
        Ok(listing)
    }

    fn view(&mut self, message: Message) -> Result<MessageView> {
        Ok(MessageView {
            sender: self.user(&message.sender_id)?,
            receiver: self.user(&message.receiver_id)?,
            home: self.listing(&message.home_id)?,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> MessageService {
        let db = Database::open(None).await.unwrap();
        for (id, first) in [("u1", "Ada"), ("u2", "Bo"), ("u3", "Cy")] {
            db.upsert_user(&UserSummary {
                id: id.into(),
                first_name: first.into(),
                last_name: "Test".into(),
                email: format!("{}@example.com", id),
            })
            .unwrap();
        }
        for (id, owner) in [("h1", "u2"), ("h2", "u2")] {
            db.upsert_listing(&ListingSummary {
                id: id.into(),
                owner_id: owner.into(),
                house_name: format!("House {}", id),
                photo_url: Some(format!("/photos/{}.jpg", id)),
            })
            .unwrap();
        }
        MessageService::new(Arc::new(db))
    }

    fn text(receiver: &str, home: &str, body: &str) -> NewMessage {
        NewMessage {
            receiver_id: receiver.into(),
            home_id: home.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    fn pdf(name: &str) -> Attachment {
        Attachment {
            file_url: attachment::public_url(&format!("1-2-{}", name)),
            file_name: name.into(),
            file_size: 1024,
            mime_type: "application/pdf".into(),
        }
    }

    #[test]
    fn test_message_type_strings() {
        for kind in [
            MessageType::Text,
            MessageType::Image,
            MessageType::File,
            MessageType::Document,
            MessageType::BookingRequest,
            MessageType::BookingConfirmation,
        ] {
            assert_eq!(MessageType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageType::parse("video"), None);
        assert_eq!(MessageType::default(), MessageType::Text);
    }

    #[tokio::test]
    async fn test_send_derives_conversation_and_enriches() {
        let svc = service().await;
        let view = svc.send("u1", text("u2", "h1", "Hi")).unwrap();

        assert_eq!(view.message.conversation_id, "u1_u2_h1");
        assert!(!view.message.is_read);
        assert_eq!(view.message.kind, MessageType::Text);
        assert_eq!(view.sender.as_ref().unwrap().first_name, "Ada");
        assert_eq!(view.receiver.as_ref().unwrap().first_name, "Bo");
        assert_eq!(view.home.as_ref().unwrap().house_name, "House h1");

        // Same key from the other side
        let reply = svc.send("u2", text("u1", "h1", "Hello")).unwrap();
        assert_eq!(reply.message.conversation_id, "u1_u2_h1");
    }

    #[tokio::test]
    async fn test_send_rejects_missing_fields_without_writing() {
        let svc = service().await;
        for req in [text("", "h1", "Hi"), text("u2", "", "Hi"), text("u2", "h1", "  ")] {
            let err = svc.send("u1", req).unwrap_err();
            assert!(matches!(err, Error::MissingFields(_)));
        }
        assert_eq!(svc.database().count_messages().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_rejects_self_and_misplaced_attachment_kinds() {
        let svc = service().await;
        assert!(matches!(
            svc.send("u1", text("u1", "h1", "note")).unwrap_err(),
            Error::CannotMessageSelf
        ));

        let mut req = text("u2", "h1", "pic");
        req.kind = MessageType::Image;
        assert!(matches!(svc.send("u1", req).unwrap_err(), Error::InvalidField(_)));
        assert_eq!(svc.database().count_messages().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_booking_messages_keep_booking_id() {
        let svc = service().await;
        let mut req = text("u2", "h1", "Can I book May 3-5?");
        req.kind = MessageType::BookingRequest;
        req.booking_id = Some("b1".into());
        let view = svc.send("u1", req).unwrap();
        assert_eq!(view.message.kind, MessageType::BookingRequest);
        assert_eq!(view.message.booking_id.as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn test_reply_must_target_same_conversation() {
        let svc = service().await;
        let first = svc.send("u1", text("u2", "h1", "Hi")).unwrap();
        let elsewhere = svc.send("u1", text("u2", "h2", "Other house")).unwrap();

        let mut reply = text("u1", "h1", "Re: hi");
        reply.reply_to = Some(first.message.id.clone());
        let view = svc.send("u2", reply).unwrap();
        assert_eq!(view.message.reply_to.as_deref(), Some(first.message.id.as_str()));

        let mut bad = text("u1", "h1", "Re: other");
        bad.reply_to = Some(elsewhere.message.id);
        assert!(matches!(svc.send("u2", bad).unwrap_err(), Error::InvalidField(_)));
    }

    #[tokio::test]
    async fn test_history_orders_oldest_first_and_checks_participants() {
        let svc = service().await;
        svc.send("u1", text("u2", "h1", "one")).unwrap();
        svc.send("u2", text("u1", "h1", "two")).unwrap();
        svc.send("u1", text("u2", "h1", "three")).unwrap();

        let bodies: Vec<String> = svc
            .history("u1_u2_h1", "u2")
            .unwrap()
            .into_iter()
            .map(|v| v.message.message)
            .collect();
        assert_eq!(bodies, vec!["one", "two", "three"]);

        assert!(matches!(
            svc.history("u1_u2_h1", "u3").unwrap_err(),
            Error::NotParticipant
        ));
        assert!(svc.history("nobody_here_h9", "u3").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_can_follow() {
        let svc = service().await;
        // No messages yet: the key decides
        assert!(svc.can_follow("u1_u2_h1", "u1").unwrap());
        assert!(!svc.can_follow("u1_u2_h1", "u3").unwrap());

        svc.send("u1", text("u2", "h1", "Hi")).unwrap();
        assert!(svc.can_follow("u1_u2_h1", "u2").unwrap());
        assert!(!svc.can_follow("u1_u2_h1", "u3").unwrap());
    }

    #[tokio::test]
    async fn test_open_conversation_marks_receiver_messages_read() {
        let svc = service().await;
        svc.send("u1", text("u2", "h1", "Hi")).unwrap();
        svc.send("u2", text("u1", "h1", "Hey")).unwrap();

        let (messages, marked) = svc.open_conversation("u1_u2_h1", "u2").unwrap();
        assert_eq!(marked, 1);
        let to_u2 = messages.iter().find(|v| v.message.receiver_id == "u2").unwrap();
        assert!(to_u2.message.is_read);
        assert!(to_u2.message.read_at.is_some());
        let to_u1 = messages.iter().find(|v| v.message.receiver_id == "u1").unwrap();
        assert!(!to_u1.message.is_read);

        // Outsiders change nothing
        assert!(svc.open_conversation("u1_u2_h1", "u3").is_err());
        assert!(!svc.history("u1_u2_h1", "u1").unwrap()[1].message.is_read);
    }

    #[tokio::test]
    async fn test_list_conversations_groups_and_counts_unread() {
        let svc = service().await;
        svc.send("u1", text("u2", "h1", "Hi")).unwrap();
        svc.send("u2", text("u1", "h1", "Hello")).unwrap();
        svc.send("u2", text("u1", "h1", "Still there?")).unwrap();
        svc.send("u3", text("u1", "h2", "About h2")).unwrap();

        let inbox = svc.list_conversations("u1").unwrap();
        assert_eq!(inbox.len(), 2);

        // Newest conversation first
        assert_eq!(inbox[0].conversation_id, "u1_u3_h2");
        assert_eq!(inbox[0].other_user_id, "u3");
        assert_eq!(inbox[0].unread_count, 1);

        assert_eq!(inbox[1].conversation_id, "u1_u2_h1");
        assert_eq!(inbox[1].last_message, "Still there?");
        assert_eq!(inbox[1].unread_count, 2);
        assert_eq!(inbox[1].other_user.as_ref().unwrap().first_name, "Bo");
        assert_eq!(inbox[1].home.as_ref().unwrap().id, "h1");

        svc.mark_read("u1_u2_h1", "u1").unwrap();
        let inbox = svc.list_conversations("u1").unwrap();
        assert_eq!(inbox[1].unread_count, 0);

        // The sender side never counts its own messages as unread
        let host_inbox = svc.list_conversations("u2").unwrap();
        assert_eq!(host_inbox.len(), 1);
        assert_eq!(host_inbox[0].unread_count, 1);
    }

    #[tokio::test]
    async fn test_listings_separate_conversations() {
        let svc = service().await;
        svc.send("u1", text("u2", "h1", "About h1")).unwrap();
        svc.send("u1", text("u2", "h2", "About h2")).unwrap();

        let h1 = svc.history("u1_u2_h1", "u1").unwrap();
        let h2 = svc.history("u1_u2_h2", "u1").unwrap();
        assert_eq!(h1.len(), 1);
        assert_eq!(h2.len(), 1);
        assert_ne!(h1[0].message.id, h2[0].message.id);
    }

    #[tokio::test]
    async fn test_edit_requires_sender() {
        let svc = service().await;
        let sent = svc.send("u1", text("u2", "h1", "Hi")).unwrap();
        let id = sent.message.id.as_str();

        assert!(matches!(
            svc.edit("u2", id, "hijack").unwrap_err(),
            Error::NotAuthorized("edit")
        ));
        assert!(matches!(
            svc.edit("u1", "missing", "x").unwrap_err(),
            Error::MessageNotFound
        ));

        let edited = svc.edit("u1", id, "Hi there").unwrap();
        assert_eq!(edited.message.message, "Hi there");
        assert!(edited.message.is_edited);
        assert!(edited.message.edited_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_requires_sender() {
        let svc = service().await;
        let sent = svc.send("u1", text("u2", "h1", "Oops")).unwrap();
        let id = sent.message.id.as_str();

        assert!(matches!(
            svc.delete("u2", id).unwrap_err(),
            Error::NotAuthorized("delete")
        ));

        let removed = svc.delete("u1", id).unwrap();
        assert_eq!(removed.conversation_id, "u1_u2_h1");
        assert!(svc.history("u1_u2_h1", "u1").unwrap().is_empty());
        assert!(matches!(svc.delete("u1", id).unwrap_err(), Error::MessageNotFound));
    }

    #[tokio::test]
    async fn test_send_attachment_classifies_and_labels() {
        let svc = service().await;
        let view = svc
            .send_attachment("u1", "u2", "h1", None, pdf("house-rules.pdf"))
            .unwrap();

        assert_eq!(view.message.kind, MessageType::Document);
        assert_eq!(view.message.message, "house-rules.pdf");
        let file = view.message.attachment.as_ref().unwrap();
        assert_eq!(file.file_url, "/uploads/chat-files/1-2-house-rules.pdf");

        // Round trip through storage keeps the file fields
        let stored = svc.history("u1_u2_h1", "u2").unwrap();
        assert_eq!(stored[0].message.attachment, view.message.attachment);

        let err = svc
            .send_attachment("u1", "", "h1", None, pdf("x.pdf"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing receiverId or homeId");
    }

    #[tokio::test]
    async fn test_message_json_shape() {
        let svc = service().await;
        let view = svc
            .send_attachment("u1", "u2", "h1", None, pdf("plan.pdf"))
            .unwrap();
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["conversationId"], "u1_u2_h1");
        assert_eq!(json["type"], "document");
        assert_eq!(json["fileName"], "plan.pdf");
        assert_eq!(json["mimeType"], "application/pdf");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["sender"]["firstName"], "Ada");
        assert_eq!(json["home"]["houseName"], "House h1");
    }

    #[tokio::test]
    async fn test_conversation_details() {
        let svc = service().await;
        let details = svc.conversation_details("u1", "h1").unwrap();
        assert_eq!(details.conversation_id, "u1_u2_h1");
        assert_eq!(details.host_id, "u2");
        assert_eq!(details.host.unwrap().first_name, "Bo");

        assert!(matches!(
            svc.conversation_details("u2", "h1").unwrap_err(),
            Error::CannotMessageSelf
        ));
        assert!(matches!(
            svc.conversation_details("u1", "h404").unwrap_err(),
            Error::ListingNotFound
        ));
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let svc = service().await;
        let a = svc.send("u1", text("u2", "h1", "a")).unwrap();
        let b = svc.send("u1", text("u2", "h1", "b")).unwrap();
        assert!(b.message.created_at > a.message.created_at);
    }
}
