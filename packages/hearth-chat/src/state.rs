//! Server state management.
//!
//! Everything a handler needs, cheap to clone: the message store, the
//! gateway's room table, the identity verifier and the attachment store.

use std::path::PathBuf;
use std::sync::Arc;

use hearth_core::messaging::attachment::MAX_ATTACHMENT_SIZE;
use hearth_core::{AttachmentPolicy, Error, MessageService, MessageView, Result};

use crate::attachment::AttachmentStore;
use crate::auth::IdentityVerifier;
use crate::gateway::Gateway;
use crate::protocol::{NotificationKind, ServerMessage};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3500;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub port: u16,
    /// Root of persisted uploads; attachments go to `<upload_dir>/chat-files`
    pub upload_dir: PathBuf,
    /// Attachment size ceiling in bytes
    pub max_upload_bytes: usize,
    /// CORS allow-list; empty means any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: MAX_ATTACHMENT_SIZE,
            allowed_origins: Vec::new(),
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Message Store operations.
    pub messages: MessageService,

    /// Room membership and fan-out for gateway connections.
    pub gateway: Gateway,

    /// Bearer credential verification, shared by REST and the gateway.
    pub verifier: Arc<dyn IdentityVerifier>,

    /// On-disk attachment storage.
    pub attachments: AttachmentStore,

    /// Server configuration.
    pub config: Arc<ChatConfig>,
}

impl AppState {
    pub fn new(
        config: ChatConfig,
        messages: MessageService,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let policy = AttachmentPolicy {
            max_size: config.max_upload_bytes,
        };
        Self {
            messages,
            gateway: Gateway::new(),
            verifier,
            attachments: AttachmentStore::new(&config.upload_dir, policy),
            config: Arc::new(config),
        }
    }

    /// Run a Message Store operation on the blocking pool.
    pub async fn store<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(MessageService) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = self.messages.clone();
        tokio::task::spawn_blocking(move || op(service))
            .await
            .map_err(|e| Error::Internal(format!("Store task failed: {}", e)))?
    }

    // ── Broadcasts ────────────────────────────────────────────────────────
    //
    // Called only after the write they describe has been persisted. A
    // broadcast that reaches nobody is not an error.

    /// Fan a new message out to its room and nudge the receiver.
    pub fn broadcast_new_message(&self, view: &MessageView) {
        let message = &view.message;
        let in_room = self.gateway.emit_to_room(
            &message.conversation_id,
            ServerMessage::NewMessage(Box::new(view.clone())),
            None,
        );
        let notified = self.gateway.notify_user(
            &message.receiver_id,
            ServerMessage::Notification {
                kind: NotificationKind::NewMessage,
                message: Box::new(view.clone()),
            },
        );
        tracing::debug!(
            message_id = message.id.as_str(),
            conversation_id = message.conversation_id.as_str(),
            in_room,
            notified,
            "Broadcast new message"
        );
    }

    /// Tell a room a message body changed. Peers get only the new text.
    pub fn broadcast_edit(&self, view: &MessageView) {
        self.gateway.emit_to_room(
            &view.message.conversation_id,
            ServerMessage::MessageEdited {
                message_id: view.message.id.clone(),
                message: view.message.message.clone(),
            },
            None,
        );
    }

    /// Tell a room a message is gone.
    pub fn broadcast_delete(&self, conversation_id: &str, message_id: &str) {
        self.gateway.emit_to_room(
            conversation_id,
            ServerMessage::MessageDeleted {
                message_id: message_id.to_string(),
            },
            None,
        );
    }

    /// Tell a room that `reader_id` has read it.
    pub fn broadcast_read(&self, conversation_id: &str, reader_id: &str) {
        self.gateway.emit_to_room(
            conversation_id,
            ServerMessage::MessagesRead {
                conversation_id: conversation_id.to_string(),
                user_id: reader_id.to_string(),
            },
            None,
        );
    }
}
