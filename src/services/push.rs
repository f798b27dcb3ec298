// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gmail push notification intake: payload decoding, duplicate
//! suppression and the mailbox-watch setup cooldown.
//!
//! Pub/Sub retries aggressively and the webhook must acknowledge
//! everything it can attribute to a retry, so both the dedup set and the
//! cooldown registry are process-local and deliberately small.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Owner marker used in logs when a payload carries no mailbox address.
pub const UNKNOWN_OWNER: &str = "unknown";

/// How many recent notification fingerprints the dedup set keeps.
const DEDUP_CAPACITY: usize = 100;

/// Minimum gap between mailbox watch setups for one user (60 minutes).
pub const SETUP_COOLDOWN_SECS: i64 = 60 * 60;

/// Decoded shape of one push delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum PushPayload {
    /// Pub/Sub envelope (`message.data` or a bare top-level `data` field)
    /// wrapping base64-encoded notification JSON.
    EncodedEnvelope {
        email_address: String,
        history_id: Option<String>,
    },
    /// The same notification posted as plain JSON.
    DirectJson {
        email_address: String,
        history_id: Option<String>,
    },
    /// Connectivity probe; acknowledged without processing.
    TestPing,
    /// Anything else; acknowledged and logged under [`UNKNOWN_OWNER`].
    Unrecognized,
}

impl PushPayload {
    /// Mailbox address the delivery belongs to, for logging.
    pub fn owner(&self) -> &str {
        match self {
            PushPayload::EncodedEnvelope { email_address, .. }
            | PushPayload::DirectJson { email_address, .. } => email_address,
            _ => UNKNOWN_OWNER,
        }
    }
}

/// Sort a parsed webhook body into one of the accepted payload shapes.
pub fn classify_payload(body: &Value) -> PushPayload {
    // Probe deliveries carry a top-level "test" key
    if body.get("test").is_some() {
        return PushPayload::TestPing;
    }

    // Pub/Sub wraps the notification as message.data; some forwarders
    // flatten it to a top-level data field
    let encoded = body
        .get("message")
        .and_then(|m| m.get("data"))
        .or_else(|| body.get("data"))
        .and_then(Value::as_str);

    if let Some(encoded) = encoded {
        return match decode_envelope(encoded) {
            Some(EnvelopeContent::Ping) => PushPayload::TestPing,
            Some(EnvelopeContent::Notification {
                email_address,
                history_id,
            }) => PushPayload::EncodedEnvelope {
                email_address,
                history_id,
            },
            None => PushPayload::Unrecognized,
        };
    }

    if let Some(email_address) = body.get("emailAddress").and_then(Value::as_str) {
        return PushPayload::DirectJson {
            email_address: email_address.to_string(),
            history_id: body.get("historyId").map(value_to_string),
        };
    }

    PushPayload::Unrecognized
}

enum EnvelopeContent {
    Notification {
        email_address: String,
        history_id: Option<String>,
    },
    Ping,
}

fn decode_envelope(encoded: &str) -> Option<EnvelopeContent> {
    let bytes = decode_base64_forgiving(encoded)?;
    let text = String::from_utf8(bytes).ok()?;

    if text.trim() == "test" {
        return Some(EnvelopeContent::Ping);
    }

    let inner: Value = serde_json::from_str(&text).ok()?;
    let email_address = inner.get("emailAddress").and_then(Value::as_str)?;

    Some(EnvelopeContent::Notification {
        email_address: email_address.to_string(),
        history_id: inner.get("historyId").map(value_to_string),
    })
}

/// Decode base64 in any of the alphabets senders actually use.
fn decode_base64_forgiving(data: &str) -> Option<Vec<u8>> {
    general_purpose::STANDARD
        .decode(data)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(data))
        .or_else(|_| general_purpose::URL_SAFE.decode(data))
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(data))
        .ok()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fingerprint of a raw webhook body, used as the dedup key.
pub fn payload_fingerprint(raw_body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_body.as_bytes());
    hex::encode(hasher.finalize())
}

// ─── Duplicate suppression ───────────────────────────────────────────────────

#[derive(Default)]
struct SeenInner {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

/// Fixed-capacity FIFO set of recently seen notification fingerprints.
#[derive(Default)]
pub struct SeenNotifications {
    inner: Mutex<SeenInner>,
}

impl SeenNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fingerprint. Returns true the first time it is seen;
    /// the oldest entry is dropped once capacity is exceeded.
    pub fn check_and_insert(&self, fingerprint: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if !inner.seen.insert(fingerprint.to_string()) {
            return false;
        }
        inner.order.push_back(fingerprint.to_string());

        if inner.order.len() > DEDUP_CAPACITY {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }
}

// ─── Watch-setup cooldown ────────────────────────────────────────────────────

/// Per-user timestamps of the last successful mailbox watch setup.
#[derive(Default)]
pub struct SetupCooldown {
    last_setup: DashMap<String, DateTime<Utc>>,
}

impl SetupCooldown {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no setup ran for this user within the cooldown window.
    pub fn should_run(&self, google_id: &str, now: DateTime<Utc>) -> bool {
        match self.last_setup.get(google_id) {
            Some(last) => now - *last > Duration::seconds(SETUP_COOLDOWN_SECS),
            None => true,
        }
    }

    /// Record a successful setup. Failed setups are not recorded, so the
    /// next sync retries them.
    pub fn mark(&self, google_id: &str, now: DateTime<Utc>) {
        self.last_setup.insert(google_id.to_string(), now);
    }
}
