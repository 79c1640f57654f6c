use presence_core::DEFAULT_MATCH_THRESHOLD;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Application/tenant id namespacing every collection.
    pub app_id: String,
    /// SQLite database path; unset means the in-memory store.
    pub db_path: Option<PathBuf>,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Capture loop tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Minimum detection confidence passed to the vision service.
    pub min_confidence: f32,
    /// Custom sign-in token; absent falls straight to anonymous.
    pub auth_token: Option<String>,
    /// Operator email attached to custom-token sessions.
    pub operator_email: Option<String>,
}

impl Config {
    /// Load configuration from `PRESENCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            app_id: std::env::var("PRESENCE_APP_ID").unwrap_or_else(|_| "presence-dev".to_string()),
            db_path: std::env::var("PRESENCE_DB_PATH").map(PathBuf::from).ok(),
            match_threshold: env_f32("PRESENCE_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            tick_interval_ms: env_u64("PRESENCE_TICK_INTERVAL_MS", 1500),
            min_confidence: env_f32("PRESENCE_MIN_CONFIDENCE", 0.6),
            auth_token: std::env::var("PRESENCE_AUTH_TOKEN").ok(),
            operator_email: std::env::var("PRESENCE_OPERATOR_EMAIL").ok(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: "presence-dev".to_string(),
            db_path: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            tick_interval_ms: 1500,
            min_confidence: 0.6,
            auth_token: None,
            operator_email: None,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
