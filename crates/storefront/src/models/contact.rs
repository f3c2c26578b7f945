//! Contact form messages.

use chrono::{DateTime, Utc};

use denim_core::{ContactMessageId, Email};

#[derive(Debug, Clone)]
pub struct ContactMessage {
    pub id: ContactMessageId,
    pub name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A validated submission from the public contact form.
#[derive(Debug, Clone)]
pub struct NewContactMessage {
    pub name: String,
    pub last_name: Option<String>,
    pub email: Email,
    pub subject: Option<String>,
    pub message: String,
}
