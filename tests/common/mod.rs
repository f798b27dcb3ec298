// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use networking_hub::config::Config;
use networking_hub::db::{self, Store};
use networking_hub::routes::create_router;
use networking_hub::services::{
    ClassifierService, GmailClient, GmailService, NotificationDispatcher, SeenNotifications,
    SetupCooldown,
};
use networking_hub::AppState;
use std::sync::Arc;

/// Create an in-memory test database with the schema applied.
#[allow(dead_code)]
pub async fn test_store() -> Store {
    let pool = db::connect_in_memory()
        .await
        .expect("Failed to open in-memory database");
    Store::new(pool)
}

/// Create a test app with offline dependencies.
/// Returns the router and the shared state.
///
/// The Gmail client points at the real Google endpoints, so only tests
/// that never reach Gmail should use this; tests that do use
/// [`create_test_app_with_gmail`] with a local stub server instead.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>) {
    build_test_app(None).await
}

/// Create a test app whose Gmail client talks to a local stub server.
#[allow(dead_code)]
pub async fn create_test_app_with_gmail(
    api_base_url: String,
    auth_base_url: String,
) -> (axum::Router, Arc<AppState>) {
    build_test_app(Some((api_base_url, auth_base_url))).await
}

async fn build_test_app(gmail_urls: Option<(String, String)>) -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let db = test_store().await;

    let client = match gmail_urls {
        Some((api_base_url, auth_base_url)) => GmailClient::with_base_urls(
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
            api_base_url,
            auth_base_url,
        ),
        None => GmailClient::new(
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        ),
    };

    let gmail = GmailService::new(client, db.clone(), &config.gcp_project_id);
    let classifier = ClassifierService::new(None);

    let state = Arc::new(AppState {
        config,
        db,
        gmail,
        classifier,
        dispatcher: NotificationDispatcher::new(),
        push_dedup: SeenNotifications::new(),
        setup_cooldown: SetupCooldown::new(),
    });

    (create_router(state.clone()), state)
}

/// Create a session JWT the way the sign-in route does.
#[allow(dead_code)]
pub fn create_test_jwt(google_id: &str, signing_key: &[u8]) -> String {
    networking_hub::middleware::auth::create_jwt(google_id, signing_key)
        .expect("Failed to create JWT")
}
