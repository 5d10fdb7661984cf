//! # Error Handling
//!
//! Error types for the Hearth messaging core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Validation Errors            → 400                                 │
//! │  │   ├── MissingFields            - Required request field absent       │
//! │  │   ├── InvalidField             - Field present but malformed         │
//! │  │   └── CannotMessageSelf        - Sender and receiver are the same    │
//! │  │                                                                      │
//! │  ├── Authorization Errors         → 403                                 │
//! │  │   ├── NotAuthorized            - Caller does not own the message     │
//! │  │   └── NotParticipant           - Caller is outside the conversation  │
//! │  │                                                                      │
//! │  ├── Not-Found Errors             → 404                                 │
//! │  │   ├── MessageNotFound                                                │
//! │  │   └── ListingNotFound                                                │
//! │  │                                                                      │
//! │  ├── Attachment Errors            → 400                                 │
//! │  │   ├── MissingAttachment        - No file in the upload               │
//! │  │   ├── UnsupportedFileType      - MIME type not on the allow-list     │
//! │  │   └── AttachmentTooLarge       - Over the size ceiling               │
//! │  │                                                                      │
//! │  ├── Storage Errors               → 500                                 │
//! │  │   ├── DatabaseError                                                  │
//! │  │   ├── StorageReadError                                               │
//! │  │   └── StorageWriteError                                              │
//! │  │                                                                      │
//! │  └── Internal Errors              → 500                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP layer maps each variant through [`Error::status_class`]; the
//! `Display` text of client-facing variants is what the caller sees.

use thiserror::Error;

/// Result type alias for Hearth core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the messaging core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================

    /// One or more required request fields are absent or empty
    #[error("{0}")]
    MissingFields(String),

    /// A field is present but its value is not acceptable
    #[error("{0}")]
    InvalidField(String),

    /// Sender and receiver resolve to the same user
    #[error("You cannot message yourself")]
    CannotMessageSelf,

    // ========================================================================
    // Authorization Errors (200-299)
    // ========================================================================

    /// Caller is not the owner of the message being mutated
    #[error("Not authorized to {0} this message")]
    NotAuthorized(&'static str),

    /// Caller is not one of the two participants of the conversation
    #[error("Not authorized to view this conversation")]
    NotParticipant,

    // ========================================================================
    // Not-Found Errors (300-399)
    // ========================================================================

    /// Message id does not resolve
    #[error("Message not found")]
    MessageNotFound,

    /// Listing id does not resolve
    #[error("Home not found")]
    ListingNotFound,

    // ========================================================================
    // Attachment Errors (400-499)
    // ========================================================================

    /// Upload carried no file part
    #[error("No file uploaded or file type not allowed")]
    MissingAttachment,

    /// MIME type is not on the allow-list
    #[error("Invalid file type: {0}. Only images, PDFs, and Word documents are allowed.")]
    UnsupportedFileType(String),

    /// File exceeds the configured ceiling
    #[error("File too large. Maximum size is {}.", size_label(.max))]
    AttachmentTooLarge {
        /// Configured ceiling in bytes
        max: usize,
    },

    // ========================================================================
    // Storage Errors (500-599)
    // ========================================================================

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification used by transport layers to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Malformed or unacceptable input (400)
    BadRequest,
    /// Authenticated but not allowed (403)
    Forbidden,
    /// Subject does not exist (404)
    NotFound,
    /// Infrastructure fault (500)
    Internal,
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Validation
    /// - 200-299: Authorization
    /// - 300-399: Not found
    /// - 400-499: Attachments
    /// - 500-599: Storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::MissingFields(_) => 100,
            Error::InvalidField(_) => 101,
            Error::CannotMessageSelf => 102,

            Error::NotAuthorized(_) => 200,
            Error::NotParticipant => 201,

            Error::MessageNotFound => 300,
            Error::ListingNotFound => 301,

            Error::MissingAttachment => 400,
            Error::UnsupportedFileType(_) => 401,
            Error::AttachmentTooLarge { .. } => 402,

            Error::DatabaseError(_) => 500,
            Error::StorageReadError(_) => 501,
            Error::StorageWriteError(_) => 502,

            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Classify the error for transport-level status mapping
    pub fn status_class(&self) -> StatusClass {
        match self.code() {
            100..=199 | 400..=499 => StatusClass::BadRequest,
            200..=299 => StatusClass::Forbidden,
            300..=399 => StatusClass::NotFound,
            _ => StatusClass::Internal,
        }
    }

    /// Whether the message is safe to show to the caller verbatim
    pub fn is_client_error(&self) -> bool {
        self.status_class() != StatusClass::Internal
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageWriteError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================

/// Human-readable byte ceiling: whole megabytes as `5MB`, fractions as
/// `0.5MB`, anything under a hundredth of a megabyte in bytes.
fn size_label(bytes: &usize) -> String {
    const MIB: usize = 1024 * 1024;
    if *bytes >= MIB && bytes % MIB == 0 {
        return format!("{}MB", bytes / MIB);
    }
    if *bytes >= MIB / 100 {
        let fixed = format!("{:.2}", *bytes as f64 / MIB as f64);
        return format!("{}MB", fixed.trim_end_matches('0').trim_end_matches('.'));
    }
    format!("{} bytes", bytes)
}
