// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod classifier;
pub mod dispatcher;
pub mod gmail;
pub mod push;

pub use classifier::ClassifierService;
pub use dispatcher::{NewEmailsEvent, NotificationDispatcher};
pub use gmail::{GmailClient, GmailService};
pub use push::{PushPayload, SeenNotifications, SetupCooldown};
