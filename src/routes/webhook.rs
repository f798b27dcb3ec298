// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for Gmail push notifications.
//!
//! Pub/Sub redelivers anything that is not acknowledged, so every
//! recognizable delivery is answered 200 even when processing fails.
//! Failures are logged and the mail is picked up by the next manual
//! sync instead.

use crate::error::AppError;
use crate::services::gmail::PUSH_FETCH_WINDOW_SECS;
use crate::services::push::{classify_payload, payload_fingerprint, PushPayload};
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Router};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/gmail-push", post(handle_push))
}

/// Handle an incoming push delivery (POST).
async fn handle_push(State(state): State<Arc<AppState>>, body: String) -> StatusCode {
    let payload: serde_json::Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse push notification body");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    // Pub/Sub retries and at-least-once delivery produce duplicates;
    // fingerprint the raw body and drop repeats.
    let fingerprint = payload_fingerprint(&body);
    if !state.push_dedup.check_and_insert(&fingerprint) {
        tracing::info!(fingerprint = %fingerprint, "Duplicate push notification, skipping");
        return StatusCode::OK;
    }

    match classify_payload(&payload) {
        PushPayload::TestPing => {
            tracing::info!("Test push notification received");
        }
        PushPayload::Unrecognized => {
            tracing::warn!(payload = %payload, "Unrecognized push notification format");
        }
        notification => {
            let email_address = notification.owner().to_string();
            if let Err(e) = process_notification(&state, &email_address).await {
                tracing::error!(
                    error = %e,
                    email = %email_address,
                    "Failed to process push notification"
                );
            }
        }
    }

    // Always return 200 OK quickly so Pub/Sub stops redelivering
    StatusCode::OK
}

/// Pull the last minute of mail for the notified mailbox and fan the
/// result out to the user's live connections.
async fn process_notification(state: &AppState, email_address: &str) -> Result<(), AppError> {
    let Some(user) = state.db.get_user_by_email(email_address).await? else {
        tracing::debug!(email = %email_address, "Push notification for unknown user");
        return Ok(());
    };

    if user.gmail_access_token.is_none() && user.gmail_refresh_token.is_none() {
        tracing::warn!(google_id = %user.google_id, "No Gmail tokens stored for push target");
        return Ok(());
    }

    let emails = state
        .gmail
        .sync_recent(&user.google_id, PUSH_FETCH_WINDOW_SECS)
        .await?;
    state.db.save_emails(user.id, &emails).await?;
    state.db.update_contacts_from_emails(user.id, &emails).await?;

    tracing::info!(
        google_id = %user.google_id,
        count = emails.len(),
        "Fetched and saved emails from push notification"
    );

    state.dispatcher.emit_new_emails(&user.google_id, emails.len());
    Ok(())
}
