// Defaults loaded from the environment (and `.env` via dotenvy in main).

use std::env;

lazy_static::lazy_static! {
    pub static ref GEMINI_API_BASE: String = env::var("GEMINI_API_BASE").unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
    pub static ref KALORIN_MODEL: String = env::var("KALORIN_MODEL").unwrap_or_else(|_| "gemini-2.0-flash-lite".to_string());
    // Server-side fallback when the user leaves the key field empty.
    pub static ref GEMINI_API_KEY: Option<String> = env::var("GEMINI_API_KEY").ok().filter(|key| !key.trim().is_empty());
    pub static ref KALORIN_TIMEOUT_SECS: u64 = env::var("KALORIN_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60);
    // Web sessions idle this long are forgotten; the oldest one goes once the cap is hit.
    pub static ref KALORIN_SESSION_TTL_SECS: u64 = env::var("KALORIN_SESSION_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(crate::session::DEFAULT_SESSION_TTL.as_secs());
    pub static ref KALORIN_MAX_SESSIONS: usize = env::var("KALORIN_MAX_SESSIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(crate::session::DEFAULT_MAX_SESSIONS);
}

pub const SESSION_COOKIE: &str = "kalorin_session";
pub const DEFAULT_PORT: u16 = 8501;
