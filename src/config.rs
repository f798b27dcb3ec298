//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup and cached in memory; handlers only
//! ever see the parsed `Config`.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- OAuth / Google ---
    /// Google OAuth client ID (public, also served to the frontend)
    pub google_client_id: String,
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// GCP project ID (used for the Gmail push Pub/Sub topic name)
    pub gcp_project_id: String,

    // --- Sessions ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,

    // --- Classification ---
    /// OpenAI API key; `None` switches classification to the keyword heuristic
    pub openai_api_key: Option<String>,

    // --- Server ---
    /// SQLite database path
    pub database_path: String,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Application name reported by /api/config
    pub app_name: String,
    /// Application version reported by /api/config
    pub app_version: String,
    /// Deployment environment label (development, production, ...)
    pub environment: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            google_client_secret: "test_secret".to_string(),
            gcp_project_id: "test-project".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            openai_api_key: None,
            database_path: "networking_hub_test.db".to_string(),
            frontend_url: "http://localhost:8000".to_string(),
            port: 8000,
            app_name: "Networking Hub".to_string(),
            app_version: "1.0.0".to_string(),
            environment: "test".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?,
            gcp_project_id: env::var("GOOGLE_CLOUD_PROJECT_ID")
                .unwrap_or_else(|_| "local-dev".to_string()),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),

            // An unset or placeholder key means "no LLM"; the classifier
            // falls back to its keyword heuristic.
            openai_api_key: env::var("OPENAI_API_KEY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && v != "your_openai_api_key_here"),

            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "networking_hub.db".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "Networking Hub".to_string()),
            app_version: env::var("APP_VERSION").unwrap_or_else(|_| "1.0.0".to_string()),
            environment: env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
