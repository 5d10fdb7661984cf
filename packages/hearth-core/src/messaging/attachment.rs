//! # Attachment Policy
//!
//! Validation and naming rules for files sent into a conversation. The
//! bytes themselves are written by the server's attachment store; this module
//! decides whether an upload is acceptable, what kind of message it becomes,
//! and what it is called on disk.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::MessageType;
use crate::error::{Error, Result};

/// Default size ceiling for a single attachment (5 MiB).
pub const MAX_ATTACHMENT_SIZE: usize = 5 * 1024 * 1024;

/// Public path segment attachments are served under.
pub const ATTACHMENT_URL_PREFIX: &str = "/uploads/chat-files";

/// Allowed MIME types for uploads.
pub const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Longest sanitized stem kept in a stored file name.
const MAX_STEM_LEN: usize = 64;

/// Longest extension kept in a stored file name, dot excluded.
const MAX_EXT_LEN: usize = 10;

/// Reference to a stored attachment, carried on the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Relative public URL (`/uploads/chat-files/<stored name>`)
    pub file_url: String,
    /// Name the uploader gave the file
    pub file_name: String,
    /// Size in bytes
    pub file_size: i64,
    pub mime_type: String,
}

/// Upload limits.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentPolicy {
    pub max_size: usize,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_size: MAX_ATTACHMENT_SIZE,
        }
    }
}

impl AttachmentPolicy {
    /// Check the MIME type against the allow-list.
    pub fn check_type(&self, mime_type: &str) -> Result<()> {
        if is_allowed_type(mime_type) {
            Ok(())
        } else {
            Err(Error::UnsupportedFileType(mime_type.to_string()))
        }
    }

    /// Check a byte count against the ceiling.
    pub fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_size {
            Err(Error::AttachmentTooLarge { max: self.max_size })
        } else {
            Ok(())
        }
    }

    /// Validate an upload and return the message kind it becomes.
    ///
    /// The type is checked before the size.
    pub fn validate(&self, mime_type: &str, size: usize) -> Result<MessageType> {
        self.check_type(mime_type)?;
        self.check_size(size)?;
        Ok(classify(mime_type))
    }
}

/// Whether a MIME type is on the allow-list.
pub fn is_allowed_type(mime_type: &str) -> bool {
    ALLOWED_TYPES.contains(&mime_type)
}

/// Message kind for an uploaded MIME type.
pub fn classify(mime_type: &str) -> MessageType {
    if mime_type.starts_with("image/") {
        MessageType::Image
    } else if mime_type == "application/pdf" {
        MessageType::Document
    } else {
        MessageType::File
    }
}

/// Public URL for a stored file name.
pub fn public_url(stored_name: &str) -> String {
    format!("{}/{}", ATTACHMENT_URL_PREFIX, stored_name)
}

/// Strip any client-side directory components from an uploaded name.
pub fn display_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();
    if base.is_empty() {
        "attachment".to_string()
    } else {
        base.to_string()
    }
}

/// Generate a collision-resistant stored name for an upload.
pub fn generate_stored_name(original: &str) -> String {
    let nonce = rand::thread_rng().gen_range(0..1_000_000_000u32);
    stored_file_name(original, crate::time::now_timestamp_millis(), nonce)
}

/// `<millis>-<nonce>-<sanitized stem><ext>`
pub fn stored_file_name(original: &str, now_millis: i64, nonce: u32) -> String {
    let name = display_name(original);
    let (stem, ext) = split_extension(&name);
    format!(
        "{}-{}-{}{}",
        now_millis,
        nonce,
        sanitize(stem, MAX_STEM_LEN),
        sanitize_extension(ext)
    )
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx + 1..]),
    }
}

fn sanitize(stem: &str, max_len: usize) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn sanitize_extension(ext: &str) -> String {
    let cleaned: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXT_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        String::new()
    } else {
        format!(".{}", cleaned)
    }
}
