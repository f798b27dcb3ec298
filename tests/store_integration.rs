// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite store integration tests against an in-memory database.

use chrono::{Duration, Utc};
use networking_hub::db::store::UpsertUser;
use networking_hub::models::{NewEmail, NewFollowUp};
use networking_hub::time_utils::format_utc_millis;

mod common;

fn upsert(google_id: &str, email: &str, access_token: Option<&str>) -> UpsertUser {
    UpsertUser {
        google_id: google_id.to_string(),
        email: email.to_string(),
        name: "Test User".to_string(),
        picture: None,
        gmail_access_token: access_token.map(str::to_string),
        gmail_refresh_token: access_token.map(|_| "refresh-1".to_string()),
        token_expires_at: None,
    }
}

/// Timestamp `hours` hours in the past, in the stored format.
fn hours_ago(hours: i64) -> String {
    format_utc_millis(Utc::now() - Duration::hours(hours))
}

fn email(gmail_id: &str, sender: &str, sender_email: &str, date_sent: &str) -> NewEmail {
    NewEmail {
        gmail_id: gmail_id.to_string(),
        thread_id: Some("thread-1".to_string()),
        subject: "Catching up".to_string(),
        sender: sender.to_string(),
        sender_email: sender_email.to_string(),
        recipient: "Me".to_string(),
        recipient_email: "me@example.com".to_string(),
        user_email: "me@example.com".to_string(),
        is_sent: sender_email == "me@example.com",
        date_sent: date_sent.to_string(),
        snippet: "snippet".to_string(),
        body: "body".to_string(),
        labels: vec!["INBOX".to_string()],
        is_read: true,
    }
}

#[tokio::test]
async fn test_upsert_user_converges_on_google_id() {
    let store = common::test_store().await;

    let first = store
        .upsert_user(&upsert("104857600000000000001", "a@example.com", Some("tok-1")))
        .await
        .unwrap();

    // Second sign-in refreshes the profile but carries no tokens
    let second = store
        .upsert_user(&upsert("104857600000000000001", "a.new@example.com", None))
        .await
        .unwrap();

    assert_eq!(first, second);

    let user = store
        .get_user_by_google_id("104857600000000000001")
        .await
        .unwrap()
        .expect("user should exist");
    assert_eq!(user.email, "a.new@example.com");
    // Absent token fields keep the stored credential
    assert_eq!(user.gmail_access_token.as_deref(), Some("tok-1"));
    assert_eq!(user.gmail_refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_update_user_tokens_keeps_refresh_when_absent() {
    let store = common::test_store().await;
    store
        .upsert_user(&upsert("104857600000000000001", "a@example.com", Some("tok-1")))
        .await
        .unwrap();

    // Refresh grants normally return only a new access token
    let expires = format_utc_millis(Utc::now() + Duration::hours(1));
    store
        .update_user_tokens("104857600000000000001", "tok-2", None, &expires)
        .await
        .unwrap();

    let user = store
        .get_user_by_google_id("104857600000000000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.gmail_access_token.as_deref(), Some("tok-2"));
    assert_eq!(user.gmail_refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(user.token_expires_at.as_deref(), Some(expires.as_str()));

    // First consent is the one time Google sends a new refresh token
    store
        .update_user_tokens("104857600000000000001", "tok-3", Some("refresh-2"), &expires)
        .await
        .unwrap();

    let user = store
        .get_user_by_google_id("104857600000000000001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.gmail_refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn test_get_user_by_email() {
    let store = common::test_store().await;
    store
        .upsert_user(&upsert("104857600000000000001", "alice@example.com", None))
        .await
        .unwrap();

    let found = store.get_user_by_email("alice@example.com").await.unwrap();
    assert_eq!(
        found.map(|u| u.google_id).as_deref(),
        Some("104857600000000000001")
    );

    assert!(store
        .get_user_by_email("nobody@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_save_emails_is_idempotent() {
    let store = common::test_store().await;
    let user_id = store
        .upsert_user(&upsert("104857600000000000001", "me@example.com", None))
        .await
        .unwrap();

    let batch = vec![
        email("g-1", "Alice", "alice@example.com", &hours_ago(1)),
        email("g-2", "Bob", "bob@example.com", &hours_ago(2)),
    ];

    assert_eq!(store.save_emails(user_id, &batch).await.unwrap(), 2);

    // Replaying the fetch rewrites the same rows
    let mut replay = batch.clone();
    replay[0].subject = "Catching up (edited)".to_string();
    store.save_emails(user_id, &replay).await.unwrap();

    let stored = store.list_recent_emails(user_id, 7).await.unwrap();
    assert_eq!(stored.len(), 2);
    // Newest first
    assert_eq!(stored[0].gmail_id, "g-1");
    assert_eq!(stored[0].subject.as_deref(), Some("Catching up (edited)"));
    assert_eq!(stored[1].gmail_id, "g-2");
}

#[tokio::test]
async fn test_list_recent_emails_honors_window() {
    let store = common::test_store().await;
    let user_id = store
        .upsert_user(&upsert("104857600000000000001", "me@example.com", None))
        .await
        .unwrap();

    let batch = vec![
        email("fresh", "Alice", "alice@example.com", &hours_ago(48)),
        email("stale", "Bob", "bob@example.com", &hours_ago(24 * 30)),
    ];
    store.save_emails(user_id, &batch).await.unwrap();

    let last_week = store.list_recent_emails(user_id, 7).await.unwrap();
    assert_eq!(last_week.len(), 1);
    assert_eq!(last_week[0].gmail_id, "fresh");

    let last_two_months = store.list_recent_emails(user_id, 60).await.unwrap();
    assert_eq!(last_two_months.len(), 2);
}

#[tokio::test]
async fn test_delete_user_emails_is_scoped() {
    let store = common::test_store().await;
    let alice = store
        .upsert_user(&upsert("104857600000000000001", "alice@example.com", None))
        .await
        .unwrap();
    let bob = store
        .upsert_user(&upsert("104857600000000000002", "bob@example.com", None))
        .await
        .unwrap();

    store
        .save_emails(alice, &[email("a-1", "Carol", "carol@example.com", &hours_ago(1))])
        .await
        .unwrap();
    store
        .save_emails(bob, &[email("b-1", "Carol", "carol@example.com", &hours_ago(1))])
        .await
        .unwrap();

    assert_eq!(store.delete_user_emails(alice).await.unwrap(), 1);
    assert!(store.list_recent_emails(alice, 7).await.unwrap().is_empty());
    assert_eq!(store.list_recent_emails(bob, 7).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conversation_covers_both_directions() {
    let store = common::test_store().await;
    let user_id = store
        .upsert_user(&upsert("104857600000000000001", "me@example.com", None))
        .await
        .unwrap();

    let mut outbound = email("g-out", "Me", "me@example.com", &hours_ago(3));
    outbound.recipient = "Bob".to_string();
    outbound.recipient_email = "bob@example.com".to_string();

    let batch = vec![
        email("g-in", "Bob", "bob@example.com", &hours_ago(1)),
        outbound,
        email("g-other", "Carol", "carol@example.com", &hours_ago(2)),
    ];
    store.save_emails(user_id, &batch).await.unwrap();

    let conversation = store
        .get_conversation(user_id, "bob@example.com")
        .await
        .unwrap();

    assert_eq!(conversation.len(), 2);
    // Newest first: the inbound reply precedes the older outbound message
    assert_eq!(conversation[0].gmail_id, "g-in");
    assert_eq!(conversation[1].gmail_id, "g-out");
}

#[tokio::test]
async fn test_contacts_aggregate_and_ordering() {
    let store = common::test_store().await;
    let user_id = store
        .upsert_user(&upsert("104857600000000000001", "me@example.com", None))
        .await
        .unwrap();

    let batch = vec![
        email("g-1", "Alice", "alice@example.com", &hours_ago(1)),
        email("g-2", "Alice", "alice@example.com", &hours_ago(5)),
        email("g-3", "Bob", "bob@example.com", &hours_ago(3)),
    ];
    store.save_emails(user_id, &batch).await.unwrap();
    store
        .update_contacts_from_emails(user_id, &batch)
        .await
        .unwrap();

    let contacts = store.list_contacts(user_id).await.unwrap();
    assert_eq!(contacts.len(), 2);
    // Most recently heard-from first
    assert_eq!(contacts[0].contact_email, "alice@example.com");
    assert_eq!(contacts[0].email_count, 2);
    assert_eq!(contacts[1].contact_email, "bob@example.com");

    let alice = store
        .get_contact(user_id, "alice@example.com")
        .await
        .unwrap()
        .expect("contact should exist");
    assert_eq!(alice.contact_name.as_deref(), Some("Alice"));
    assert!(alice.first_email_date.unwrap() < alice.last_email_date.unwrap());
}

#[tokio::test]
async fn test_follow_up_crud_scoped_to_user() {
    let store = common::test_store().await;
    let alice = store
        .upsert_user(&upsert("104857600000000000001", "alice@example.com", None))
        .await
        .unwrap();
    let bob = store
        .upsert_user(&upsert("104857600000000000002", "bob@example.com", None))
        .await
        .unwrap();

    let new_follow_up = |email: &str, score: f64| NewFollowUp {
        contact_email: email.to_string(),
        contact_name: Some("Contact".to_string()),
        conversation_summary: Some("Summary".to_string()),
        networking_score: score,
        needs_followup: true,
        followup_reason: Some("Networking conversation: job_opportunity".to_string()),
        suggested_action: Some("Follow up on this job_opportunity conversation".to_string()),
        priority: "high".to_string(),
        status: "pending".to_string(),
    };

    let low = store
        .save_follow_up(alice, &new_follow_up("carol@example.com", 4.5))
        .await
        .unwrap();
    let high = store
        .save_follow_up(alice, &new_follow_up("dave@example.com", 9.0))
        .await
        .unwrap();
    store
        .save_follow_up(bob, &new_follow_up("erin@example.com", 7.0))
        .await
        .unwrap();

    // Best score first, scoped to the owner
    let alices = store.list_follow_ups(alice).await.unwrap();
    assert_eq!(alices.len(), 2);
    assert_eq!(alices[0].id, high);
    assert_eq!(alices[1].id, low);

    // Bob cannot change Alice's rows
    assert_eq!(
        store
            .update_follow_up_status(bob, high, "completed")
            .await
            .unwrap(),
        0
    );
    assert_eq!(store.delete_follow_up(bob, high).await.unwrap(), 0);

    // Alice can
    assert_eq!(
        store
            .update_follow_up_status(alice, high, "completed")
            .await
            .unwrap(),
        1
    );
    assert_eq!(store.delete_follow_up(alice, low).await.unwrap(), 1);

    let remaining = store.list_follow_ups(alice).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, high);
    assert_eq!(remaining[0].status, "completed");
}
