// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed CRUD over the SQLite pool.
//!
//! All multi-row writes run inside a transaction. Upserts converge on the
//! table's unique key, so replaying a fetch is harmless.

use crate::error::Result;
use crate::models::{Contact, Email, FollowUp, NewEmail, NewFollowUp, User};
use crate::time_utils;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePool;

/// Typed access to the application database.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// User fields accepted at sign-in. Token fields are optional; absent
/// values leave any stored credential untouched.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpsertUser {
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    #[serde(default)]
    pub gmail_access_token: Option<String>,
    #[serde(default)]
    pub gmail_refresh_token: Option<String>,
    #[serde(default)]
    pub token_expires_at: Option<String>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ─── Users ───────────────────────────────────────────────────────────────

    /// Insert or update a user keyed on `google_id`, returning the row id.
    pub async fn upsert_user(&self, user: &UpsertUser) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO users (google_id, email, name, picture,
                               gmail_access_token, gmail_refresh_token, token_expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(google_id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                picture = excluded.picture,
                gmail_access_token = COALESCE(excluded.gmail_access_token, gmail_access_token),
                gmail_refresh_token = COALESCE(excluded.gmail_refresh_token, gmail_refresh_token),
                token_expires_at = COALESCE(excluded.token_expires_at, token_expires_at),
                updated_at = CURRENT_TIMESTAMP;
            "#,
        )
        .bind(&user.google_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.picture)
        .bind(&user.gmail_access_token)
        .bind(&user.gmail_refresh_token)
        .bind(&user.token_expires_at)
        .execute(&self.pool)
        .await?;

        let row: (i64,) = sqlx::query_as("SELECT id FROM users WHERE google_id = ?1")
            .bind(&user.google_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    pub async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = ?1")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Store a refreshed credential. A `None` refresh token keeps the one
    /// already on the row (Google only returns it on first consent).
    pub async fn update_user_tokens(
        &self,
        google_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET gmail_access_token = ?1,
                gmail_refresh_token = COALESCE(?2, gmail_refresh_token),
                token_expires_at = ?3,
                updated_at = CURRENT_TIMESTAMP
            WHERE google_id = ?4;
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(google_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Emails ──────────────────────────────────────────────────────────────

    /// Upsert a batch of fetched messages for one user.
    pub async fn save_emails(&self, user_id: i64, emails: &[NewEmail]) -> Result<usize> {
        if emails.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for email in emails {
            sqlx::query(
                r#"
                INSERT INTO emails (
                    user_id, gmail_id, thread_id, subject, sender, sender_email,
                    recipient, recipient_email, user_email, is_sent, date_sent,
                    snippet, body, labels, is_read
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT(user_id, gmail_id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    subject = excluded.subject,
                    sender = excluded.sender,
                    sender_email = excluded.sender_email,
                    recipient = excluded.recipient,
                    recipient_email = excluded.recipient_email,
                    user_email = excluded.user_email,
                    is_sent = excluded.is_sent,
                    date_sent = excluded.date_sent,
                    snippet = excluded.snippet,
                    body = excluded.body,
                    labels = excluded.labels,
                    is_read = excluded.is_read;
                "#,
            )
            .bind(user_id)
            .bind(&email.gmail_id)
            .bind(&email.thread_id)
            .bind(&email.subject)
            .bind(&email.sender)
            .bind(&email.sender_email)
            .bind(&email.recipient)
            .bind(&email.recipient_email)
            .bind(&email.user_email)
            .bind(email.is_sent)
            .bind(&email.date_sent)
            .bind(&email.snippet)
            .bind(&email.body)
            .bind(serde_json::to_string(&email.labels).unwrap_or_else(|_| "[]".into()))
            .bind(email.is_read)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(emails.len())
    }

    /// Emails for a user sent within the last `days` days, newest first.
    pub async fn list_recent_emails(&self, user_id: i64, days: i64) -> Result<Vec<Email>> {
        let cutoff = time_utils::format_utc_millis(Utc::now() - Duration::days(days));

        let emails = sqlx::query_as::<_, Email>(
            r#"
            SELECT * FROM emails
            WHERE user_id = ?1 AND date_sent >= ?2
            ORDER BY date_sent DESC;
            "#,
        )
        .bind(user_id)
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }

    /// Delete every stored email for a user, returning the row count.
    pub async fn delete_user_emails(&self, user_id: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM emails WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    /// Full message history with one contact, newest first.
    pub async fn get_conversation(
        &self,
        user_id: i64,
        contact_email: &str,
    ) -> Result<Vec<Email>> {
        let emails = sqlx::query_as::<_, Email>(
            r#"
            SELECT * FROM emails
            WHERE user_id = ?1 AND (sender_email = ?2 OR recipient_email = ?2)
            ORDER BY date_sent DESC;
            "#,
        )
        .bind(user_id)
        .bind(contact_email)
        .fetch_all(&self.pool)
        .await?;
        Ok(emails)
    }

    // ─── Contacts ────────────────────────────────────────────────────────────

    /// Recompute contact aggregates from a fetched batch.
    ///
    /// Aggregation is keyed on `sender_email` over the batch alone, and the
    /// upsert overwrites any existing aggregate for that contact.
    pub async fn update_contacts_from_emails(
        &self,
        user_id: i64,
        emails: &[NewEmail],
    ) -> Result<usize> {
        let aggregates = aggregate_contacts(emails);
        if aggregates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for contact in &aggregates {
            sqlx::query(
                r#"
                INSERT INTO contacts
                    (user_id, contact_email, contact_name,
                     first_email_date, last_email_date, email_count, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
                ON CONFLICT(user_id, contact_email) DO UPDATE SET
                    contact_name = excluded.contact_name,
                    first_email_date = excluded.first_email_date,
                    last_email_date = excluded.last_email_date,
                    email_count = excluded.email_count,
                    updated_at = CURRENT_TIMESTAMP;
                "#,
            )
            .bind(user_id)
            .bind(&contact.contact_email)
            .bind(&contact.contact_name)
            .bind(&contact.first_email_date)
            .bind(&contact.last_email_date)
            .bind(contact.email_count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(aggregates.len())
    }

    /// Contacts for a user, most recently heard-from first.
    pub async fn list_contacts(&self, user_id: i64) -> Result<Vec<Contact>> {
        let contacts = sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE user_id = ?1
            ORDER BY last_email_date DESC, email_count DESC;
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    pub async fn get_contact(
        &self,
        user_id: i64,
        contact_email: &str,
    ) -> Result<Option<Contact>> {
        let contact = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE user_id = ?1 AND contact_email = ?2",
        )
        .bind(user_id)
        .bind(contact_email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(contact)
    }

    // ─── Follow-ups ──────────────────────────────────────────────────────────

    /// Insert a follow-up suggestion, returning its id.
    pub async fn save_follow_up(&self, user_id: i64, follow_up: &NewFollowUp) -> Result<i64> {
        let res = sqlx::query(
            r#"
            INSERT INTO follow_ups
                (user_id, contact_email, contact_name, conversation_summary,
                 networking_score, needs_followup, followup_reason,
                 suggested_action, priority, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, CURRENT_TIMESTAMP);
            "#,
        )
        .bind(user_id)
        .bind(&follow_up.contact_email)
        .bind(&follow_up.contact_name)
        .bind(&follow_up.conversation_summary)
        .bind(follow_up.networking_score)
        .bind(follow_up.needs_followup)
        .bind(&follow_up.followup_reason)
        .bind(&follow_up.suggested_action)
        .bind(&follow_up.priority)
        .bind(&follow_up.status)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// Follow-ups for a user, best networking score first.
    pub async fn list_follow_ups(&self, user_id: i64) -> Result<Vec<FollowUp>> {
        let follow_ups = sqlx::query_as::<_, FollowUp>(
            r#"
            SELECT * FROM follow_ups
            WHERE user_id = ?1
            ORDER BY networking_score DESC, created_at DESC;
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follow_ups)
    }

    /// Update a follow-up's status. Scoped to the owning user; returns the
    /// number of rows changed (0 means no such row for this user).
    pub async fn update_follow_up_status(
        &self,
        user_id: i64,
        follow_up_id: i64,
        status: &str,
    ) -> Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE follow_ups
            SET status = ?1, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?2 AND user_id = ?3;
            "#,
        )
        .bind(status)
        .bind(follow_up_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    /// Delete a follow-up, scoped to the owning user.
    pub async fn delete_follow_up(&self, user_id: i64, follow_up_id: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM follow_ups WHERE id = ?1 AND user_id = ?2")
            .bind(follow_up_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

/// One contact's aggregate, derived from a single batch.
#[derive(Debug, Clone, PartialEq)]
struct ContactAggregate {
    contact_email: String,
    contact_name: String,
    first_email_date: String,
    last_email_date: String,
    email_count: i64,
}

/// Fold a batch of messages into per-sender aggregates. The first message
/// seen for a sender fixes the display name.
fn aggregate_contacts(emails: &[NewEmail]) -> Vec<ContactAggregate> {
    let mut order: Vec<String> = Vec::new();
    let mut map: std::collections::HashMap<String, ContactAggregate> =
        std::collections::HashMap::new();

    for email in emails {
        let key = email.sender_email.clone();
        match map.get_mut(&key) {
            Some(contact) => {
                contact.email_count += 1;
                if let (Some(date), Some(first)) = (
                    time_utils::parse_utc(&email.date_sent),
                    time_utils::parse_utc(&contact.first_email_date),
                ) {
                    if date < first {
                        contact.first_email_date = email.date_sent.clone();
                    }
                }
                if let (Some(date), Some(last)) = (
                    time_utils::parse_utc(&email.date_sent),
                    time_utils::parse_utc(&contact.last_email_date),
                ) {
                    if date > last {
                        contact.last_email_date = email.date_sent.clone();
                    }
                }
            }
            None => {
                order.push(key.clone());
                map.insert(
                    key,
                    ContactAggregate {
                        contact_email: email.sender_email.clone(),
                        contact_name: email.sender.clone(),
                        first_email_date: email.date_sent.clone(),
                        last_email_date: email.date_sent.clone(),
                        email_count: 1,
                    },
                );
            }
        }
    }

    order.into_iter().filter_map(|key| map.remove(&key)).collect()
}
