// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Live event fan-out to connected clients.
//!
//! Each user gets a broadcast channel; WebSocket handlers subscribe on
//! connect and the webhook path publishes without waiting on anyone.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of each user's event channel. A slow consumer lags and drops
/// events instead of blocking the webhook path.
const CHANNEL_CAPACITY: usize = 32;

/// Payload delivered to a user's live connections when new mail lands.
#[derive(Debug, Clone, Serialize)]
pub struct NewEmailsEvent {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub count: usize,
    pub message: String,
}

/// Per-user broadcast channels for server-pushed events.
#[derive(Default)]
pub struct NotificationDispatcher {
    channels: DashMap<String, broadcast::Sender<NewEmailsEvent>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one user's event stream.
    pub fn subscribe(&self, google_id: &str) -> broadcast::Receiver<NewEmailsEvent> {
        self.channels
            .entry(google_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a new-mail event for one user. A user with no live
    /// connections is a no-op.
    pub fn emit_new_emails(&self, google_id: &str, count: usize) {
        if let Some(sender) = self.channels.get(google_id) {
            let event = NewEmailsEvent {
                user_id: google_id.to_string(),
                count,
                message: format!("New emails received! Found {} emails.", count),
            };
            // Err means every receiver is gone; nothing to deliver
            let _ = sender.send(event);
        }
    }

    /// Number of live connections for a user.
    pub fn connection_count(&self, google_id: &str) -> usize {
        self.channels
            .get(google_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let dispatcher = NotificationDispatcher::new();
        let mut rx = dispatcher.subscribe("104857600000000000001");

        dispatcher.emit_new_emails("104857600000000000001", 3);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id, "104857600000000000001");
        assert_eq!(event.count, 3);
        assert_eq!(event.message, "New emails received! Found 3 emails.");
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let dispatcher = NotificationDispatcher::new();
        // No channel exists for this user at all
        dispatcher.emit_new_emails("104857600000000000002", 1);
        assert_eq!(dispatcher.connection_count("104857600000000000002"), 0);

        // A channel whose receiver has gone away is also fine
        let rx = dispatcher.subscribe("104857600000000000003");
        drop(rx);
        dispatcher.emit_new_emails("104857600000000000003", 1);
        assert_eq!(dispatcher.connection_count("104857600000000000003"), 0);
    }

    #[tokio::test]
    async fn test_events_are_scoped_per_user() {
        let dispatcher = NotificationDispatcher::new();
        let mut alice = dispatcher.subscribe("104857600000000000004");
        let mut bob = dispatcher.subscribe("104857600000000000005");

        dispatcher.emit_new_emails("104857600000000000004", 2);

        assert_eq!(alice.recv().await.unwrap().count, 2);
        assert!(bob.try_recv().is_err());
    }
}
