//! User model for storage and API.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User row as stored in SQLite.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Row id (referenced by emails, contacts and follow-ups)
    pub id: i64,
    /// Google account subject (all digits, may exceed u64)
    pub google_id: String,
    /// Email address
    pub email: String,
    /// Display name
    pub name: String,
    /// Profile picture URL
    pub picture: Option<String>,
    /// Gmail API access token
    #[serde(skip_serializing, default)]
    pub gmail_access_token: Option<String>,
    /// Gmail API refresh token
    #[serde(skip_serializing, default)]
    pub gmail_refresh_token: Option<String>,
    /// When the access token expires (ISO 8601)
    pub token_expires_at: Option<String>,
    /// When the user first signed in
    pub created_at: String,
    /// Last profile update
    pub updated_at: String,
}

/// Profile slice safe to hand to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            google_id: self.google_id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
        }
    }
}
