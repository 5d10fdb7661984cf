//! # Directory
//!
//! Read-only view of the users and listings that the rest of the marketplace
//! owns. Messaging references both by id and only needs them for display
//! enrichment and to find a listing's host.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Public profile fields of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Listing fields shown next to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub id: String,
    pub owner_id: String,
    pub house_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Lookup of users and listings by id.
pub trait Directory: Send + Sync {
    /// Resolve a user id, `None` if unknown.
    fn user(&self, id: &str) -> Result<Option<UserSummary>>;

    /// Resolve a listing id, `None` if unknown.
    fn listing(&self, id: &str) -> Result<Option<ListingSummary>>;
}
