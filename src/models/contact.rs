//! Contact aggregates derived from stored emails.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-contact aggregate row, recomputed from each fetched batch.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub user_id: i64,
    pub contact_email: String,
    pub contact_name: Option<String>,
    /// Earliest message seen from this contact (ISO 8601)
    pub first_email_date: Option<String>,
    /// Latest message seen from this contact (ISO 8601)
    pub last_email_date: Option<String>,
    pub email_count: i64,
    pub created_at: String,
    pub updated_at: String,
}
