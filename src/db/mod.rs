//! Database layer (SQLite).

pub mod store;

pub use store::Store;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Open (or create) the database file and prepare the schema.
pub async fn connect(database_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let url = format!("sqlite://{}?mode=rwc", database_path);
    let pool = SqlitePool::connect(&url).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests.
///
/// `sqlite::memory:` gives every connection its own database, so the pool
/// is pinned to a single connection that is never recycled.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes, then apply additive migrations.
///
/// A failure here is fatal; the server refuses to start without a schema.
async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON;").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            google_id TEXT UNIQUE NOT NULL,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            picture TEXT,
            gmail_access_token TEXT,
            gmail_refresh_token TEXT,
            token_expires_at DATETIME,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS emails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            gmail_id TEXT NOT NULL,
            thread_id TEXT,
            subject TEXT,
            sender TEXT,
            sender_email TEXT,
            recipient TEXT,
            recipient_email TEXT,
            user_email TEXT,
            is_sent BOOLEAN DEFAULT 0,
            date_sent DATETIME,
            snippet TEXT,
            body TEXT,
            labels TEXT,
            is_read BOOLEAN DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users (id),
            UNIQUE(user_id, gmail_id)
        );
        CREATE INDEX IF NOT EXISTS idx_emails_user_id ON emails(user_id);
        CREATE INDEX IF NOT EXISTS idx_emails_date_sent ON emails(date_sent);
        CREATE INDEX IF NOT EXISTS idx_emails_gmail_id ON emails(gmail_id);

        CREATE TABLE IF NOT EXISTS contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            contact_email TEXT NOT NULL,
            contact_name TEXT,
            first_email_date DATETIME,
            last_email_date DATETIME,
            email_count INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users (id),
            UNIQUE(user_id, contact_email)
        );

        CREATE TABLE IF NOT EXISTS follow_ups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            contact_email TEXT NOT NULL,
            contact_name TEXT,
            conversation_summary TEXT,
            networking_score REAL DEFAULT 0.0,
            needs_followup BOOLEAN DEFAULT 0,
            followup_reason TEXT,
            suggested_action TEXT,
            priority TEXT DEFAULT 'medium',
            status TEXT DEFAULT 'pending',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users (id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Migration: token columns were added to the users table after launch
    let _ = sqlx::query("ALTER TABLE users ADD COLUMN gmail_access_token TEXT;")
        .execute(pool)
        .await;
    let _ = sqlx::query("ALTER TABLE users ADD COLUMN gmail_refresh_token TEXT;")
        .execute(pool)
        .await;
    let _ = sqlx::query("ALTER TABLE users ADD COLUMN token_expires_at DATETIME;")
        .execute(pool)
        .await;
    // Ignore errors (column might already exist)

    // Migration: sent-mail tracking columns on emails
    let _ = sqlx::query("ALTER TABLE emails ADD COLUMN user_email TEXT;")
        .execute(pool)
        .await;
    let _ = sqlx::query("ALTER TABLE emails ADD COLUMN is_sent BOOLEAN DEFAULT 0;")
        .execute(pool)
        .await;
    // Ignore errors (column might already exist)

    Ok(())
}
