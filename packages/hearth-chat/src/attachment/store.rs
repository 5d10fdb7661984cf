//! File-backed attachment store.
//!
//! Attachments are stored on disk at `{UPLOAD_DIR}/chat-files/{storedName}`,
//! where the stored name is `<millis>-<random>-<sanitized stem><ext>`. Files
//! are written to a `.tmp` sibling first and renamed into place, so a reader
//! never sees a partial file.

use std::path::{Path, PathBuf};

use hearth_core::messaging::attachment::{
    display_name, generate_stored_name, public_url, ATTACHMENT_URL_PREFIX,
};
use hearth_core::{Attachment, AttachmentPolicy, Error, Result};

/// Subdirectory of the upload root that holds chat attachments.
const CHAT_FILES_DIR: &str = "chat-files";

/// File-backed attachment store.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
    policy: AttachmentPolicy,
}

impl AttachmentStore {
    /// Create a store rooted at `upload_dir`.
    pub fn new(upload_dir: &Path, policy: AttachmentPolicy) -> Self {
        Self {
            dir: upload_dir.join(CHAT_FILES_DIR),
            policy,
        }
    }

    pub fn policy(&self) -> AttachmentPolicy {
        self.policy
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and persist an upload, returning the reference to put on the message.
    pub async fn save(&self, original_name: &str, mime_type: &str, data: &[u8]) -> Result<Attachment> {
        self.policy.validate(mime_type, data.len())?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            tracing::error!(error = %e, dir = %self.dir.display(), "Failed to create attachment directory");
            Error::StorageWriteError(format!("Failed to create storage directory: {}", e))
        })?;

        let stored_name = generate_stored_name(original_name);
        let file_path = self.dir.join(&stored_name);
        let tmp_path = self.dir.join(format!("{}.tmp", stored_name));

        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            tracing::error!(error = %e, path = %tmp_path.display(), "Failed to write attachment");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::StorageWriteError(format!("Failed to write attachment: {}", e)));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &file_path).await {
            tracing::error!(error = %e, "Failed to rename temp attachment file");
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::StorageWriteError(format!("Failed to finalize attachment: {}", e)));
        }

        tracing::info!(
            stored_name = stored_name.as_str(),
            size = data.len(),
            mime_type,
            "Attachment stored"
        );

        Ok(Attachment {
            file_url: public_url(&stored_name),
            file_name: display_name(original_name),
            file_size: data.len() as i64,
            mime_type: mime_type.to_string(),
        })
    }

    /// Remove a stored attachment, e.g. when its message could not be persisted.
    pub async fn remove(&self, attachment: &Attachment) {
        let Some(name) = stored_name_from_url(&attachment.file_url) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(self.dir.join(name)).await {
            tracing::warn!(error = %e, stored_name = name, "Failed to remove orphaned attachment");
        }
    }

    /// Read a stored attachment and its content type.
    ///
    /// Returns `None` for unknown names and for names that are not a single
    /// plain path segment.
    pub async fn read(&self, stored_name: &str) -> Result<Option<(Vec<u8>, &'static str)>> {
        if !is_plain_file_name(stored_name) {
            return Ok(None);
        }
        match tokio::fs::read(self.dir.join(stored_name)).await {
            Ok(data) => Ok(Some((data, content_type_for(stored_name)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageReadError(format!("Failed to read attachment: {}", e))),
        }
    }
}

fn stored_name_from_url(url: &str) -> Option<&str> {
    url.strip_prefix(ATTACHMENT_URL_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|name| is_plain_file_name(name))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with(".tmp")
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

/// Infer content type from extension
fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
