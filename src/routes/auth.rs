// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth authentication routes.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::store::UpsertUser;
use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::models::UserProfile;
use crate::services::gmail::decode_id_token_claims;
use crate::time_utils::format_utc_millis;
use crate::AppState;

/// Name of the session cookie checked by the auth middleware.
const SESSION_COOKIE: &str = "nhub_token";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/config", get(get_config))
        .route("/api/auth/google", post(google_sign_in))
}

// ─── Frontend Config ─────────────────────────────────────────

/// Public configuration the frontend needs before sign-in.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub success: bool,
    pub google_client_id: String,
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        success: true,
        google_client_id: state.config.google_client_id.clone(),
        app_name: state.config.app_name.clone(),
        app_version: state.config.app_version.clone(),
        environment: state.config.environment.clone(),
    })
}

// ─── Google Sign-in ──────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInBody {
    pub code: String,
    pub redirect_uri: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub success: bool,
    pub token: String,
    pub user: UserProfile,
}

/// Sign in with an OAuth authorization code from the Google popup.
///
/// Exchanges the code for Gmail tokens, reads the user's identity from
/// the id_token, stores both, and issues a session JWT. The token is
/// returned in the body and also set as an HttpOnly cookie.
async fn google_sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<SignInBody>,
) -> Result<(CookieJar, Json<SignInResponse>)> {
    let tokens = state
        .gmail
        .exchange_code(&body.code, &body.redirect_uri)
        .await?;

    let id_token = tokens
        .id_token
        .as_deref()
        .ok_or_else(|| AppError::GmailApi("No id_token in token response".to_string()))?;
    let claims = decode_id_token_claims(id_token)?;

    let expires_at = format_utc_millis(Utc::now() + Duration::seconds(tokens.expires_in));
    let upsert = UpsertUser {
        google_id: claims.sub.clone(),
        email: claims.email.clone().unwrap_or_default(),
        name: claims.name.clone().unwrap_or_default(),
        picture: claims.picture.clone(),
        gmail_access_token: Some(tokens.access_token.clone()),
        gmail_refresh_token: tokens.refresh_token.clone(),
        token_expires_at: Some(expires_at),
    };
    let user_id = state.db.upsert_user(&upsert).await?;

    tracing::info!(google_id = %claims.sub, user_id, "User signed in");

    let jwt = create_jwt(&claims.sub, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let response = SignInResponse {
        success: true,
        token: jwt.clone(),
        user: UserProfile {
            google_id: claims.sub,
            email: claims.email.unwrap_or_default(),
            name: claims.name.unwrap_or_default(),
            picture: claims.picture,
        },
    };

    Ok((jar.add(session_cookie(jwt)), Json(response)))
}

/// Build the session cookie. The JWT carries its own expiry, so this is
/// a session cookie rather than a persistent one.
fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc.def.ghi".to_string());

        assert_eq!(cookie.name(), "nhub_token");
        assert_eq!(cookie.value(), "abc.def.ghi");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
