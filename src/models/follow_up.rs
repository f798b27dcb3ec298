// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Follow-up suggestions produced by conversation analysis.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored follow-up suggestion.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FollowUp {
    pub id: i64,
    pub user_id: i64,
    pub contact_email: String,
    pub contact_name: Option<String>,
    pub conversation_summary: Option<String>,
    /// Networking relevance, 0.0 to 10.0
    pub networking_score: f64,
    pub needs_followup: bool,
    pub followup_reason: Option<String>,
    pub suggested_action: Option<String>,
    /// high / medium / low
    pub priority: String,
    /// pending / completed / dismissed
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Follow-up fields produced by analysis, before the row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFollowUp {
    pub contact_email: String,
    pub contact_name: Option<String>,
    pub conversation_summary: Option<String>,
    pub networking_score: f64,
    pub needs_followup: bool,
    pub followup_reason: Option<String>,
    pub suggested_action: Option<String>,
    pub priority: String,
    pub status: String,
}
