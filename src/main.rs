// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Networking Hub API Server
//!
//! Syncs Gmail conversations, spots networking opportunities, and keeps
//! connected browsers up to date over WebSocket as new mail arrives.

use networking_hub::{
    config::Config,
    db::{self, Store},
    services::push::{SeenNotifications, SetupCooldown},
    services::{ClassifierService, GmailClient, GmailService, NotificationDispatcher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Networking Hub API");

    // Open (and if needed create) the SQLite database
    let pool = db::connect(&config.database_path)
        .await
        .expect("Failed to open database");
    let store = Store::new(pool);
    tracing::info!(path = %config.database_path, "Database ready");

    // Initialize Gmail service
    let gmail_client = GmailClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );
    let gmail = GmailService::new(gmail_client, store.clone(), &config.gcp_project_id);

    // Initialize conversation classifier
    let classifier = ClassifierService::new(config.openai_api_key.clone());
    if config.openai_api_key.is_none() {
        tracing::warn!("No OpenAI API key configured, using keyword heuristic only");
    }

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db: store,
        gmail,
        classifier,
        dispatcher: NotificationDispatcher::new(),
        push_dedup: SeenNotifications::new(),
        setup_cooldown: SetupCooldown::new(),
    });

    // Build router
    let app = networking_hub::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("networking_hub=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
