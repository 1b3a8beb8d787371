//! Data models for chatsync
//!
//! A `Message` is one entry of the shared chat feed as the server reported it.
//! The client never edits or re-orders messages; it only holds the latest
//! snapshot the server returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Opaque server identifier, unique within a snapshot
    pub id: String,
    /// Sender display name (server supplied, may be empty)
    pub username: String,
    /// Message body
    pub text: String,
    /// When the server recorded the message
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            text: text.into(),
            timestamp,
        }
    }

    /// Whether this message was sent by the given user
    pub fn is_from(&self, username: &str) -> bool {
        !self.username.is_empty() && self.username == username
    }
}
