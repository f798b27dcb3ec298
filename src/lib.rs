// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Networking Hub: Turn your inbox into a networking pipeline
//!
//! This crate provides the backend API for syncing Gmail messages,
//! spotting networking conversations, and pushing live new-mail events
//! to connected browsers.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::push::{SeenNotifications, SetupCooldown};
use services::{ClassifierService, GmailService, NotificationDispatcher};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Store,
    pub gmail: GmailService,
    pub classifier: ClassifierService,
    pub dispatcher: NotificationDispatcher,
    /// Recently seen push notification fingerprints (webhook dedup).
    pub push_dedup: SeenNotifications,
    /// Per-user cooldown for mailbox watch registration.
    pub setup_cooldown: SetupCooldown,
}
