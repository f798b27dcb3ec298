// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gmail API client for fetching and normalizing mail.
//!
//! Handles:
//! - OAuth code exchange and token refresh
//! - Message listing and full-format fetches
//! - Normalization of raw messages into database rows
//! - Mailbox watch registration for push notifications

use crate::error::AppError;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

/// Maximum messages fetched per sync.
const MAX_FETCH_RESULTS: u32 = 100;

/// Gmail API client.
#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    api_base_url: String,
    auth_base_url: String,
    client_id: String,
    client_secret: String,
}

impl GmailClient {
    /// Create a new Gmail client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_base_urls(
            client_id,
            client_secret,
            "https://gmail.googleapis.com/gmail/v1".to_string(),
            "https://oauth2.googleapis.com".to_string(),
        )
    }

    /// Create a client pointed at alternate endpoints (used by tests).
    pub fn with_base_urls(
        client_id: String,
        client_secret: String,
        api_base_url: String,
        auth_base_url: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base_url,
            auth_base_url,
            client_id,
            client_secret,
        }
    }

    /// Get the authenticated user's profile (email address).
    pub async fn get_profile(&self, access_token: &str) -> Result<GmailProfile, AppError> {
        let url = format!("{}/users/me/profile", self.api_base_url);
        self.get_json(&url, access_token).await
    }

    /// List message ids matching a search query.
    pub async fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
    ) -> Result<Vec<MessageRef>, AppError> {
        let url = format!("{}/users/me/messages", self.api_base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("q", query.to_string()),
                ("maxResults", MAX_FETCH_RESULTS.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        let list: MessageListResponse = self.check_response_json(response).await?;
        Ok(list.messages)
    }

    /// Fetch a single message in full format (headers, body and labels).
    pub async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<GmailMessage, AppError> {
        let url = format!("{}/users/me/messages/{}", self.api_base_url, message_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Register a mailbox watch that publishes INBOX changes to a topic.
    pub async fn watch_mailbox(
        &self,
        access_token: &str,
        topic_name: &str,
    ) -> Result<WatchResponse, AppError> {
        let url = format!("{}/users/me/watch", self.api_base_url);

        let body = serde_json::json!({
            "topicName": topic_name,
            "labelIds": ["INBOX"]
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Exchange an OAuth authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenExchangeResponse, AppError> {
        let url = format!("{}/token", self.auth_base_url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::GmailApi(format!("Code exchange request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let url = format!("{}/token", self.auth_base_url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::GmailApi(format!("Token refresh request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Gmail rate limit hit (429)");
                return Err(AppError::RateLimited);
            }

            // Unauthorized - token may be expired
            if status.as_u16() == 401 {
                return Err(AppError::CredentialExpired);
            }

            return Err(AppError::GmailApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GmailApi(format!("JSON parse error: {}", e)))
    }
}

/// Profile response for the authenticated user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailProfile {
    pub email_address: String,
    #[serde(default)]
    pub messages_total: u64,
}

/// Message list response. The `messages` field is absent entirely when
/// nothing matches the query.
#[derive(Debug, Clone, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

/// Id reference from a message list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Full-format message response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    /// Epoch milliseconds, serialized by Gmail as a string.
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// Message payload part. Multipart messages nest these recursively.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default)]
    pub body: Option<MessageBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub data: Option<String>,
}

/// Mailbox watch registration response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    #[serde(default)]
    pub history_id: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
}

/// Token response from the OAuth code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Token response from a refresh grant. Google normally omits the
/// refresh token here; the stored one stays valid.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Identity claims carried in Google's id_token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleIdClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Read the claims out of an id_token payload.
///
/// The token arrives directly from Google's token endpoint over TLS, so
/// the payload is decoded without re-verifying the signature.
pub fn decode_id_token_claims(id_token: &str) -> Result<GoogleIdClaims, AppError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::GmailApi("Malformed id_token".to_string()))?;

    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| general_purpose::URL_SAFE.decode(payload))
        .map_err(|_| AppError::GmailApi("Malformed id_token payload".to_string()))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::GmailApi(format!("Failed to parse id_token claims: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Message normalization
// ─────────────────────────────────────────────────────────────────────────────

use crate::models::NewEmail;
use crate::time_utils;
use chrono::{DateTime, Duration, Utc};

/// Look up a header value by name, case-insensitively. Missing headers
/// read as the empty string.
fn header_value<'a>(headers: &'a [MessageHeader], name: &str) -> &'a str {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
        .unwrap_or("")
}

/// Extract the display name from a `Name <addr>` header, stripping one
/// layer of surrounding quotes. Falls back to the whole header.
fn extract_name(header: &str) -> String {
    if header.ends_with('>') {
        if let Some(idx) = header.find('<') {
            let name = header[..idx].trim();
            if !name.is_empty() {
                let name = name.strip_prefix(['"', '\'']).unwrap_or(name);
                let name = name.strip_suffix(['"', '\'']).unwrap_or(name);
                return name.to_string();
            }
        }
    }
    header.trim().to_string()
}

/// Extract the address from a `Name <addr>` header. Falls back to the
/// whole header when there are no angle brackets.
fn extract_email(header: &str) -> String {
    if header.ends_with('>') {
        if let Some(idx) = header.find('<') {
            return header[idx + 1..header.len() - 1].trim().to_string();
        }
    }
    header.trim().to_string()
}

/// Decode a base64 body chunk. Gmail uses the URL-safe alphabet, but
/// padding varies, so try the common variants.
fn decode_base64_text(data: &str) -> String {
    general_purpose::URL_SAFE
        .decode(data)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(data))
        .or_else(|_| general_purpose::STANDARD.decode(data))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Collect body text from multipart parts. Plain text parts are always
/// appended; HTML is used only while no plain text has been found yet,
/// and nested multiparts are walked recursively.
fn body_from_parts(parts: &[MessagePart]) -> String {
    let mut body = String::new();
    for part in parts {
        let mime_type = part.mime_type.as_deref().unwrap_or("");
        let data = part.body.as_ref().and_then(|b| b.data.as_deref());

        if mime_type == "text/plain" {
            if let Some(data) = data {
                body.push_str(&decode_base64_text(data));
            }
        } else if mime_type == "text/html" && body.is_empty() {
            if let Some(data) = data {
                body.push_str(&decode_base64_text(data));
            }
        } else if !part.parts.is_empty() {
            body.push_str(&body_from_parts(&part.parts));
        }
    }
    body
}

/// Build the search query for a trailing window ending now.
fn after_query(now: DateTime<Utc>, window_secs: i64) -> String {
    format!("after:{}", (now - Duration::seconds(window_secs)).timestamp())
}

/// Normalize a full-format message into a database row.
///
/// Returns None when the message has no payload or no usable internal
/// date; such messages are skipped rather than failing the whole sync.
fn normalize_message(message: &GmailMessage, user_email: &str) -> Option<NewEmail> {
    let payload = message.payload.as_ref()?;

    let millis: i64 = message.internal_date.as_deref()?.parse().ok()?;
    let date_sent = time_utils::format_utc_millis(DateTime::from_timestamp_millis(millis)?);

    let from = header_value(&payload.headers, "From");
    let to = header_value(&payload.headers, "To");
    let subject = header_value(&payload.headers, "Subject");

    let sender_email = extract_email(from);
    let recipient_email = extract_email(to);
    let is_sent = sender_email == user_email;

    let body = match payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        Some(data) => decode_base64_text(data),
        None => body_from_parts(&payload.parts),
    };

    Some(NewEmail {
        gmail_id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        subject: if subject.is_empty() {
            "No Subject".to_string()
        } else {
            subject.to_string()
        },
        sender: extract_name(from),
        sender_email,
        recipient: extract_name(to),
        recipient_email,
        user_email: user_email.to_string(),
        is_sent,
        date_sent,
        snippet: message.snippet.clone(),
        body,
        labels: message.label_ids.clone(),
        is_read: !message.label_ids.iter().any(|l| l == "UNREAD"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// GmailService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::Store;
use crate::models::User;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Trailing window fetched when a push notification arrives (1 minute).
pub const PUSH_FETCH_WINDOW_SECS: i64 = 60;

/// Trailing window fetched on a user-initiated sync (7 days).
pub const MANUAL_SYNC_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

/// Shared refresh locks type for use in AppState.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// High-level Gmail service that manages token lifecycle and API calls.
///
/// This service encapsulates:
/// - Access token retrieval from the users table
/// - Automatic token refresh when expiring (with 5-minute margin)
/// - Per-user locking to prevent duplicate refresh calls
/// - Windowed mailbox syncs returning normalized rows
/// - Mailbox watch registration for push notifications
#[derive(Clone)]
pub struct GmailService {
    client: GmailClient,
    db: Store,
    /// Fully qualified Pub/Sub topic that mailbox watches publish to.
    topic_name: String,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
}

impl GmailService {
    /// Create a new Gmail service around an already-configured client.
    pub fn new(client: GmailClient, db: Store, gcp_project_id: &str) -> Self {
        Self {
            client,
            db,
            topic_name: format!(
                "projects/{}/topics/gmail-push-notifications",
                gcp_project_id
            ),
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    // ─── OAuth ───────────────────────────────────────────────────────────────

    /// Exchange an OAuth authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenExchangeResponse, AppError> {
        self.client.exchange_code(code, redirect_uri).await
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expired) access token for the given user.
    ///
    /// Uses the stored token while it has margin left, otherwise refreshes
    /// under a per-user lock so concurrent requests trigger one refresh.
    pub async fn get_valid_access_token(&self, google_id: &str) -> Result<String, AppError> {
        let now = Utc::now();

        // ─────────────────────────────────────────────────────────────
        // STEP 1: Use the stored token while it has margin left
        // ─────────────────────────────────────────────────────────────
        let user = self.read_user(google_id).await?;
        if let Some(token) = usable_access_token(&user, now) {
            return Ok(token);
        }

        // ─────────────────────────────────────────────────────────────
        // STEP 2: Acquire per-user refresh lock
        // ─────────────────────────────────────────────────────────────
        // This ensures only one task per user performs the refresh.
        // Other tasks wait here until refresh completes.
        let lock = self
            .refresh_locks
            .entry(google_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // ─────────────────────────────────────────────────────────────
        // STEP 3: Re-read after acquiring the lock (double-check)
        // ─────────────────────────────────────────────────────────────
        // Another task may have refreshed while we were waiting.
        let user = self.read_user(google_id).await?;
        if let Some(token) = usable_access_token(&user, now) {
            return Ok(token);
        }

        // ─────────────────────────────────────────────────────────────
        // STEP 4: Refresh and persist the new token
        // ─────────────────────────────────────────────────────────────
        self.refresh_and_store(&user).await
    }

    /// Force a refresh regardless of the stored expiry.
    ///
    /// Used after a 401 from the API, which can beat the expiry margin
    /// when a token is revoked early.
    pub async fn refresh_access_token(&self, google_id: &str) -> Result<String, AppError> {
        let lock = self
            .refresh_locks
            .entry(google_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let user = self.read_user(google_id).await?;
        self.refresh_and_store(&user).await
    }

    async fn read_user(&self, google_id: &str) -> Result<User, AppError> {
        self.db
            .get_user_by_google_id(google_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", google_id)))
    }

    /// Run the refresh grant and persist the result on the user row.
    async fn refresh_and_store(&self, user: &User) -> Result<String, AppError> {
        let refresh_token = user
            .gmail_refresh_token
            .as_deref()
            .ok_or(AppError::CredentialExpired)?;

        tracing::info!(google_id = %user.google_id, "Access token expired, refreshing");

        let refreshed = match self.client.refresh_token(refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) if e.is_gmail_token_error() => {
                // Refresh token revoked; the user has to sign in again
                return Err(AppError::CredentialExpired);
            }
            Err(e) => return Err(e),
        };

        let expires_at =
            time_utils::format_utc_millis(Utc::now() + Duration::seconds(refreshed.expires_in));
        self.db
            .update_user_tokens(
                &user.google_id,
                &refreshed.access_token,
                refreshed.refresh_token.as_deref(),
                &expires_at,
            )
            .await?;

        Ok(refreshed.access_token)
    }

    // ─── Mailbox Sync ────────────────────────────────────────────────────────

    /// Fetch and normalize messages from a trailing window ending now.
    ///
    /// Retries once with a forced refresh if the API rejects the token;
    /// a 401 can beat the expiry margin when a token is revoked early.
    pub async fn sync_recent(
        &self,
        google_id: &str,
        window_secs: i64,
    ) -> Result<Vec<NewEmail>, AppError> {
        let token = self.get_valid_access_token(google_id).await?;

        match self.fetch_window(&token, window_secs).await {
            Err(e) if e.is_gmail_token_error() => {
                tracing::info!(google_id, "Token rejected mid-sync, retrying after refresh");
                let token = self.refresh_access_token(google_id).await?;
                self.fetch_window(&token, window_secs).await
            }
            result => result,
        }
    }

    async fn fetch_window(
        &self,
        access_token: &str,
        window_secs: i64,
    ) -> Result<Vec<NewEmail>, AppError> {
        let profile = self.client.get_profile(access_token).await?;
        let query = after_query(Utc::now(), window_secs);

        let refs = self.client.list_message_ids(access_token, &query).await?;
        tracing::debug!(count = refs.len(), %query, "Listed matching messages");

        let mut emails = Vec::with_capacity(refs.len());
        for message_ref in &refs {
            match self.client.get_message(access_token, &message_ref.id).await {
                Ok(message) => {
                    if let Some(email) = normalize_message(&message, &profile.email_address) {
                        emails.push(email);
                    }
                }
                Err(e) if e.is_gmail_token_error() => return Err(e),
                Err(e) => {
                    // One bad message should not fail the whole sync
                    tracing::warn!(message_id = %message_ref.id, error = %e, "Skipping message");
                }
            }
        }

        Ok(emails)
    }

    // ─── Push Notifications ──────────────────────────────────────────────────

    /// Register a mailbox watch so new INBOX mail hits our webhook.
    pub async fn setup_push_notifications(&self, google_id: &str) -> Result<(), AppError> {
        let token = self.get_valid_access_token(google_id).await?;
        let watch = self.client.watch_mailbox(&token, &self.topic_name).await?;

        tracing::info!(
            google_id,
            history_id = ?watch.history_id,
            expiration = ?watch.expiration,
            "Mailbox watch registered"
        );
        Ok(())
    }
}

/// Return the stored access token if it is still usable at `now`.
///
/// A missing or unparseable expiry counts as unknown; the token is used
/// as-is and a 401 falls back to the forced-refresh retry.
fn usable_access_token(user: &User, now: DateTime<Utc>) -> Option<String> {
    let token = user.gmail_access_token.clone()?;
    match user
        .token_expires_at
        .as_deref()
        .and_then(time_utils::parse_utc)
    {
        Some(expires_at) if now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= expires_at => {
            None
        }
        _ => Some(token),
    }
}
