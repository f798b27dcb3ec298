// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Full API flow: profile save, stored mail, contacts, conversation
//! analysis and follow-up lifecycle, using the keyword classifier.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, Utc};
use networking_hub::models::NewEmail;
use networking_hub::time_utils::format_utc_millis;
use serde_json::json;
use tower::ServiceExt;

mod common;

const GOOGLE_ID: &str = "104857600000000000001";
const USER_EMAIL: &str = "alice@example.com";

fn hours_ago(hours: i64) -> String {
    format_utc_millis(Utc::now() - Duration::hours(hours))
}

fn inbound_email(
    gmail_id: &str,
    sender: &str,
    sender_email: &str,
    subject: &str,
    snippet: &str,
    date_sent: &str,
) -> NewEmail {
    NewEmail {
        gmail_id: gmail_id.to_string(),
        thread_id: Some(format!("thread-{}", gmail_id)),
        subject: subject.to_string(),
        sender: sender.to_string(),
        sender_email: sender_email.to_string(),
        recipient: "Alice Doe".to_string(),
        recipient_email: USER_EMAIL.to_string(),
        user_email: USER_EMAIL.to_string(),
        is_sent: false,
        date_sent: date_sent.to_string(),
        snippet: snippet.to_string(),
        body: String::new(),
        labels: vec!["INBOX".to_string()],
        is_read: true,
    }
}

fn authed(request: axum::http::request::Builder, jwt: &str) -> axum::http::request::Builder {
    request.header(header::AUTHORIZATION, format!("Bearer {}", jwt))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_save_user_and_analyze_flow() {
    let (app, state) = common::create_test_app().await;
    let jwt = common::create_test_jwt(GOOGLE_ID, &state.config.jwt_signing_key);

    // Sign-in flow posts the profile
    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri("/api/save-user")
                    .header("content-type", "application/json"),
                &jwt,
            )
            .body(Body::from(
                json!({
                    "google_id": GOOGLE_ID,
                    "email": USER_EMAIL,
                    "name": "Alice Doe"
                })
                .to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let saved = body_json(response).await;
    assert_eq!(saved["success"], true);
    let user_id = saved["userId"].as_i64().expect("userId should be numeric");

    // Mail lands (normally via sync or push); one networking thread,
    // one personal thread
    let batch = vec![
        inbound_email(
            "g-job",
            "Bob Chen",
            "bob@startup.io",
            "Job opportunity at Acme",
            "We are hiring, can you interview next week",
            &hours_ago(2),
        ),
        inbound_email(
            "g-dinner",
            "Mom",
            "mom@example.com",
            "Dinner plans",
            "See you on Sunday at six",
            &hours_ago(4),
        ),
    ];
    state.db.save_emails(user_id, &batch).await.unwrap();
    state
        .db
        .update_contacts_from_emails(user_id, &batch)
        .await
        .unwrap();

    // Contacts reflect the batch
    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/contacts/{}", GOOGLE_ID)),
                &jwt,
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    let contacts = body_json(response).await;
    assert_eq!(contacts["contacts"].as_array().unwrap().len(), 2);
    assert_eq!(contacts["contacts"][0]["contact_email"], "bob@startup.io");

    // Conversation view for one contact
    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder().method("GET").uri(format!(
                    "/api/conversation/{}/bob@startup.io",
                    GOOGLE_ID
                )),
                &jwt,
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let conversation = body_json(response).await;
    assert_eq!(conversation["contact"]["contact_name"], "Bob Chen");
    assert_eq!(conversation["conversation"].as_array().unwrap().len(), 1);
    assert_eq!(conversation["conversation"][0]["gmail_id"], "g-job");

    // Analysis flags the hiring thread and skips the personal one
    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/analyze-conversations/{}", GOOGLE_ID)),
                &jwt,
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let analysis = body_json(response).await;
    assert_eq!(analysis["success"], true);
    assert_eq!(
        analysis["message"],
        "Analyzed 2 conversations and found 1 networking conversations"
    );
    let follow_ups = analysis["followUps"].as_array().unwrap();
    assert_eq!(follow_ups.len(), 1);
    let item = &follow_ups[0];
    assert_eq!(item["contact_email"], "bob@startup.io");
    assert_eq!(item["contact_name"], "Bob Chen");
    // job, opportunity, hiring, interview -> 5 + 4
    assert_eq!(item["networking_score"], 9.0);
    assert_eq!(item["priority"], "high");
    assert_eq!(
        item["followup_reason"],
        "Networking conversation: professional_connection"
    );
    assert_eq!(
        item["suggested_action"],
        "Follow up on this professional_connection conversation"
    );
    assert_eq!(item["status"], "pending");
    // Analysis results are returned as produced, before row ids exist
    assert!(item.get("id").is_none());

    // The stored follow-up is visible with its id
    let response = app
        .clone()
        .oneshot(
            authed(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/follow-ups/{}", GOOGLE_ID)),
                &jwt,
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    let stored = body_json(response).await;
    let stored_items = stored["followUps"].as_array().unwrap();
    assert_eq!(stored_items.len(), 1);
    assert!(stored_items[0]["id"].as_i64().unwrap() > 0);
    assert_eq!(stored_items[0]["contact_email"], "bob@startup.io");

    // Clearing stored mail reports the row count
    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/emails/{}", GOOGLE_ID)),
                &jwt,
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    let deleted = body_json(response).await;
    assert_eq!(deleted["success"], true);
    assert_eq!(deleted["message"], "Deleted 2 emails");
    assert_eq!(deleted["deletedCount"], 2);
}

#[tokio::test]
async fn test_analyze_with_no_contacts() {
    let (app, state) = common::create_test_app().await;
    let jwt = common::create_test_jwt(GOOGLE_ID, &state.config.jwt_signing_key);

    state
        .db
        .upsert_user(&networking_hub::db::store::UpsertUser {
            google_id: GOOGLE_ID.to_string(),
            email: USER_EMAIL.to_string(),
            name: "Alice Doe".to_string(),
            picture: None,
            gmail_access_token: None,
            gmail_refresh_token: None,
            token_expires_at: None,
        })
        .await
        .unwrap();

    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/analyze-conversations/{}", GOOGLE_ID)),
                &jwt,
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["message"], "No contacts found to analyze");
    assert!(json["followUps"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_analyze_with_contacts_but_no_mail() {
    let (app, state) = common::create_test_app().await;
    let jwt = common::create_test_jwt(GOOGLE_ID, &state.config.jwt_signing_key);

    state
        .db
        .upsert_user(&networking_hub::db::store::UpsertUser {
            google_id: GOOGLE_ID.to_string(),
            email: USER_EMAIL.to_string(),
            name: "Alice Doe".to_string(),
            picture: None,
            gmail_access_token: None,
            gmail_refresh_token: None,
            token_expires_at: None,
        })
        .await
        .unwrap();

    let user = state
        .db
        .get_user_by_google_id(GOOGLE_ID)
        .await
        .unwrap()
        .unwrap();

    // Contacts survive an email purge; their conversations are empty
    let batch = vec![inbound_email(
        "g-1",
        "Bob Chen",
        "bob@startup.io",
        "Hello",
        "Just checking in",
        &hours_ago(1),
    )];
    state.db.save_emails(user.id, &batch).await.unwrap();
    state
        .db
        .update_contacts_from_emails(user.id, &batch)
        .await
        .unwrap();
    state.db.delete_user_emails(user.id).await.unwrap();

    let response = app
        .oneshot(
            authed(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/analyze-conversations/{}", GOOGLE_ID)),
                &jwt,
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["message"], "No conversations found to analyze");
}
