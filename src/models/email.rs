// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email models: the stored row and the normalized form produced by a
//! Gmail fetch before it is written.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One Gmail message as stored per user.
///
/// `labels` keeps the JSON-encoded label array exactly as written, so
/// list endpoints return it as a string.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Email {
    pub id: i64,
    pub user_id: i64,
    /// Gmail message id, unique per user
    pub gmail_id: String,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    /// Display name of the sender
    pub sender: Option<String>,
    pub sender_email: Option<String>,
    /// Raw To: header
    pub recipient: Option<String>,
    pub recipient_email: Option<String>,
    /// Address of the mailbox this row was fetched for
    pub user_email: Option<String>,
    /// True when the mailbox owner sent this message
    pub is_sent: bool,
    /// When the message was sent (ISO 8601)
    pub date_sent: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    /// JSON-encoded Gmail label ids
    pub labels: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// A normalized message fresh from the Gmail API, ready to upsert.
///
/// Header-derived fields are empty strings rather than None when the
/// header is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmail {
    pub gmail_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub recipient: String,
    pub recipient_email: String,
    pub user_email: String,
    pub is_sent: bool,
    pub date_sent: String,
    pub snippet: String,
    pub body: String,
    pub labels: Vec<String>,
    pub is_read: bool,
}
