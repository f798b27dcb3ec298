// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::db::store::UpsertUser;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Contact, Email, FollowUp, NewFollowUp, User};
use crate::services::gmail::MANUAL_SYNC_WINDOW_SECS;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/save-user", post(save_user))
        .route("/api/sync-emails/{google_id}", post(sync_emails))
        .route("/api/emails/{google_id}", get(get_emails).delete(delete_emails))
        .route("/api/contacts/{google_id}", get(get_contacts))
        .route(
            "/api/conversation/{google_id}/{contact_email}",
            get(get_conversation),
        )
        .route(
            "/api/analyze-conversations/{google_id}",
            post(analyze_conversations),
        )
        .route("/api/follow-ups/{google_id}", get(get_follow_ups))
        .route("/api/follow-up/{follow_up_id}/status", put(update_follow_up_status))
        .route("/api/follow-up/{follow_up_id}", delete(delete_follow_up))
}

/// Path ids must look like Google account ids before any lookups run.
fn validate_google_id(google_id: &str) -> Result<()> {
    if google_id.len() < 10 || !google_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest("Invalid user ID format".to_string()));
    }
    Ok(())
}

/// Reject requests whose path names a different account than the session.
fn ensure_owner(google_id: &str, auth: &AuthUser) -> Result<()> {
    validate_google_id(google_id)?;
    if auth.google_id != google_id {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

async fn lookup_user(state: &AppState, google_id: &str) -> Result<User> {
    state
        .db
        .get_user_by_google_id(google_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

// ─── User Profile ────────────────────────────────────────────

/// Response for saving a user profile.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveUserResponse {
    pub success: bool,
    pub user_id: i64,
}

/// Create or update the signed-in user's row.
///
/// The Google sign-in flow posts the profile here after the session
/// token is issued; repeat sign-ins refresh name and picture.
async fn save_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<UpsertUser>,
) -> Result<Json<SaveUserResponse>> {
    ensure_owner(&body.google_id, &auth)?;

    let user_id = state.db.upsert_user(&body).await?;
    tracing::info!(google_id = %body.google_id, user_id, "User saved");

    Ok(Json(SaveUserResponse {
        success: true,
        user_id,
    }))
}

// ─── Email Sync ──────────────────────────────────────────────

/// Response for a manual sync.
#[derive(Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub count: usize,
    pub message: String,
}

/// Fetch the last week of mail, upsert it, and refresh contacts.
///
/// Also registers the Gmail mailbox watch so pushes start flowing, at
/// most once per user per hour. A failed watch registration is logged
/// and retried on the next sync rather than failing the response.
async fn sync_emails(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(google_id): Path<String>,
) -> Result<Json<SyncResponse>> {
    ensure_owner(&google_id, &auth)?;
    let user = lookup_user(&state, &google_id).await?;

    if user.gmail_access_token.is_none() && user.gmail_refresh_token.is_none() {
        return Err(AppError::CredentialExpired);
    }

    let emails = state
        .gmail
        .sync_recent(&google_id, MANUAL_SYNC_WINDOW_SECS)
        .await?;
    state.db.save_emails(user.id, &emails).await?;
    state.db.update_contacts_from_emails(user.id, &emails).await?;

    if state.setup_cooldown.should_run(&google_id, Utc::now()) {
        match state.gmail.setup_push_notifications(&google_id).await {
            Ok(()) => state.setup_cooldown.mark(&google_id, Utc::now()),
            Err(e) => {
                tracing::warn!(google_id = %google_id, error = %e, "Push setup failed")
            }
        }
    } else {
        tracing::debug!(google_id = %google_id, "Push setup on cooldown");
    }

    let count = emails.len();
    Ok(Json(SyncResponse {
        success: true,
        count,
        message: format!("Synced {} emails and started real-time monitoring", count),
    }))
}

// ─── Emails ──────────────────────────────────────────────────

/// How far back the email listing reaches, in days.
const EMAIL_LIST_WINDOW_DAYS: i64 = 7;

#[derive(Serialize)]
pub struct EmailsResponse {
    pub success: bool,
    pub emails: Vec<Email>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEmailsResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: u64,
}

/// List the user's stored emails from the last week.
async fn get_emails(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(google_id): Path<String>,
) -> Result<Json<EmailsResponse>> {
    ensure_owner(&google_id, &auth)?;
    let user = lookup_user(&state, &google_id).await?;

    let emails = state
        .db
        .list_recent_emails(user.id, EMAIL_LIST_WINDOW_DAYS)
        .await?;
    tracing::debug!(google_id = %google_id, count = emails.len(), "Fetched emails");

    Ok(Json(EmailsResponse {
        success: true,
        emails,
    }))
}

/// Delete all stored emails for the user.
async fn delete_emails(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(google_id): Path<String>,
) -> Result<Json<DeleteEmailsResponse>> {
    ensure_owner(&google_id, &auth)?;
    let user = lookup_user(&state, &google_id).await?;

    let deleted_count = state.db.delete_user_emails(user.id).await?;
    tracing::info!(google_id = %google_id, deleted_count, "Deleted emails");

    Ok(Json(DeleteEmailsResponse {
        success: true,
        message: format!("Deleted {} emails", deleted_count),
        deleted_count,
    }))
}

// ─── Contacts ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ContactsResponse {
    pub success: bool,
    pub contacts: Vec<Contact>,
}

#[derive(Serialize)]
pub struct ConversationResponse {
    pub success: bool,
    pub contact: Contact,
    pub conversation: Vec<Email>,
}

/// List contacts derived from the user's mail.
async fn get_contacts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(google_id): Path<String>,
) -> Result<Json<ContactsResponse>> {
    ensure_owner(&google_id, &auth)?;
    let user = lookup_user(&state, &google_id).await?;

    let contacts = state.db.list_contacts(user.id).await?;

    Ok(Json(ContactsResponse {
        success: true,
        contacts,
    }))
}

/// Get the message history with one contact, newest first.
async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path((google_id, contact_email)): Path<(String, String)>,
) -> Result<Json<ConversationResponse>> {
    ensure_owner(&google_id, &auth)?;
    let user = lookup_user(&state, &google_id).await?;

    let contact = state
        .db
        .get_contact(user.id, &contact_email)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact not found".to_string()))?;

    let conversation = state.db.get_conversation(user.id, &contact_email).await?;
    tracing::debug!(
        google_id = %google_id,
        contact_email = %contact_email,
        count = conversation.len(),
        "Fetched conversation"
    );

    Ok(Json(ConversationResponse {
        success: true,
        contact,
        conversation,
    }))
}

// ─── Conversation Analysis ───────────────────────────────────

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "followUps")]
    pub follow_ups: Vec<NewFollowUp>,
}

/// Classify every contact's conversation and store follow-ups for the
/// ones that look like networking opportunities.
async fn analyze_conversations(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(google_id): Path<String>,
) -> Result<Json<AnalyzeResponse>> {
    ensure_owner(&google_id, &auth)?;
    let user = lookup_user(&state, &google_id).await?;

    let contacts = state.db.list_contacts(user.id).await?;
    if contacts.is_empty() {
        return Ok(Json(AnalyzeResponse {
            success: true,
            message: "No contacts found to analyze".to_string(),
            follow_ups: vec![],
        }));
    }

    let mut conversations = Vec::new();
    for contact in &contacts {
        let conversation = state
            .db
            .get_conversation(user.id, &contact.contact_email)
            .await?;
        if !conversation.is_empty() {
            conversations.push(conversation);
        }
    }

    if conversations.is_empty() {
        return Ok(Json(AnalyzeResponse {
            success: true,
            message: "No conversations found to analyze".to_string(),
            follow_ups: vec![],
        }));
    }

    tracing::info!(
        google_id = %google_id,
        count = conversations.len(),
        "Analyzing conversations"
    );
    let analyses = state.classifier.analyze_conversations(&conversations).await;
    let analyzed = conversations.len();

    let mut follow_ups = Vec::new();
    for analysis in analyses {
        let contact_name = contacts
            .iter()
            .find(|c| c.contact_email == analysis.contact_email)
            .and_then(|c| c.contact_name.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        let verdict = analysis.verdict;

        let follow_up = NewFollowUp {
            contact_email: analysis.contact_email,
            contact_name: Some(contact_name),
            conversation_summary: Some(verdict.conversation_summary),
            networking_score: verdict.networking_score,
            needs_followup: true,
            followup_reason: Some(format!(
                "Networking conversation: {}",
                verdict.networking_type
            )),
            suggested_action: Some(format!(
                "Follow up on this {} conversation",
                verdict.networking_type
            )),
            priority: priority_for_score(verdict.networking_score),
            status: "pending".to_string(),
        };

        state.db.save_follow_up(user.id, &follow_up).await?;
        follow_ups.push(follow_up);
    }

    Ok(Json(AnalyzeResponse {
        success: true,
        message: format!(
            "Analyzed {} conversations and found {} networking conversations",
            analyzed,
            follow_ups.len()
        ),
        follow_ups,
    }))
}

fn priority_for_score(score: f64) -> String {
    if score >= 7.0 {
        "high"
    } else if score >= 4.0 {
        "medium"
    } else {
        "low"
    }
    .to_string()
}

// ─── Follow-ups ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct FollowUpsResponse {
    pub success: bool,
    #[serde(rename = "followUps")]
    pub follow_ups: Vec<FollowUp>,
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// List stored follow-ups, highest score first.
async fn get_follow_ups(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(google_id): Path<String>,
) -> Result<Json<FollowUpsResponse>> {
    ensure_owner(&google_id, &auth)?;
    let user = lookup_user(&state, &google_id).await?;

    let follow_ups = state.db.list_follow_ups(user.id).await?;

    Ok(Json(FollowUpsResponse {
        success: true,
        follow_ups,
    }))
}

/// Update a follow-up's status. Only rows owned by the session's user
/// are visible here, so a foreign id reads as not found.
async fn update_follow_up_status(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(follow_up_id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Result<Json<MessageResponse>> {
    let user = lookup_user(&state, &auth.google_id).await?;

    let changed = state
        .db
        .update_follow_up_status(user.id, follow_up_id, &body.status)
        .await?;
    if changed == 0 {
        return Err(AppError::NotFound("Follow-up not found".to_string()));
    }

    tracing::info!(follow_up_id, status = %body.status, "Follow-up status updated");
    Ok(Json(MessageResponse {
        success: true,
        message: "Follow-up status updated".to_string(),
    }))
}

/// Delete a follow-up owned by the session's user.
async fn delete_follow_up(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(follow_up_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    let user = lookup_user(&state, &auth.google_id).await?;

    let changed = state.db.delete_follow_up(user.id, follow_up_id).await?;
    if changed == 0 {
        return Err(AppError::NotFound("Follow-up not found".to_string()));
    }

    tracing::info!(follow_up_id, "Follow-up deleted");
    Ok(Json(MessageResponse {
        success: true,
        message: "Follow-up deleted".to_string(),
    }))
}
