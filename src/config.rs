// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Number of options every multiple-choice question carries.
pub const OPTIONS_PER_QUESTION: usize = 4;

/// Hidden-tab transitions tolerated before a session is force-submitted.
pub const DEFAULT_MAX_TAB_SWITCHES: u32 = 2;

/// How long a finished session stays readable before it is dropped (seconds).
pub const SESSION_LINGER_SECONDS: u64 = 600;

/// Background redelivery attempts for a queued submission before its session is dropped.
pub const DELIVERY_RETRY_LIMIT: u32 = 5;

/// Model endpoint used for question generation when only `AI_API_KEY` is given.
pub const DEFAULT_AI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

/// Upper bound on questions requested from the generator in one call.
pub const MAX_GENERATED_QUESTIONS: u32 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Without it the server runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    pub max_tab_switches: u32,

    /// Question generation endpoint. Generation is disabled when unset.
    pub ai_api_url: Option<String>,
    pub ai_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60 * 60 * 8);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let max_tab_switches = env::var("MAX_TAB_SWITCHES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_TAB_SWITCHES);

        let ai_api_key = env::var("AI_API_KEY").ok().filter(|key| !key.is_empty());
        let ai_api_url = env::var("AI_API_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .or_else(|| ai_api_key.as_ref().map(|_| DEFAULT_AI_API_URL.to_string()));

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            port,
            max_tab_switches,
            ai_api_url,
            ai_api_key,
        }
    }
}
