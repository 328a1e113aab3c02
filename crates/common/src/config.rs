use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string (delivery ledger)
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Timeout for permission/preference lookups, in milliseconds (default: 3000)
    pub lookup_timeout_ms: u64,

    /// Timeout for a single channel send, in milliseconds (default: 10000)
    pub send_timeout_ms: u64,

    /// How long a `pending` ledger entry is considered owned by a live
    /// attempt before it may be reclaimed, in seconds (default: 60)
    pub pending_liveness_secs: u64,

    /// Base delay before the first in-dispatch retry, in milliseconds (default: 500)
    pub retry_base_delay_ms: u64,

    /// Exponential backoff multiplier (default: 2.0)
    pub retry_multiplier: f64,

    /// Maximum delivery attempts per triple within one dispatch (default: 3)
    pub retry_max_attempts: u32,

    /// Disable self-notification suppression — the comment author is then
    /// notified like any other member. For testing/audit only (default: false)
    pub notify_self: bool,

    /// Email delivery API endpoint (Resend-style HTTP API)
    pub email_api_url: Option<String>,

    /// Email delivery API key
    pub email_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Realtime push gateway endpoint
    pub push_gateway_url: Option<String>,

    /// Internal in-app feed service endpoint
    pub in_app_feed_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            lookup_timeout_ms: std::env::var("LOOKUP_TIMEOUT_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("LOOKUP_TIMEOUT_MS must be a valid u64"))?,
            send_timeout_ms: std::env::var("SEND_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SEND_TIMEOUT_MS must be a valid u64"))?,
            pending_liveness_secs: std::env::var("PENDING_LIVENESS_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PENDING_LIVENESS_SECS must be a valid u64"))?,
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_BASE_DELAY_MS must be a valid u64"))?,
            retry_multiplier: std::env::var("RETRY_MULTIPLIER")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_MULTIPLIER must be a valid f64"))?,
            retry_max_attempts: std::env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be a valid u32"))?,
            notify_self: std::env::var("NOTIFY_SELF")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            email_api_url: std::env::var("EMAIL_API_URL").ok(),
            email_api_key: std::env::var("EMAIL_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            push_gateway_url: std::env::var("PUSH_GATEWAY_URL").ok(),
            in_app_feed_url: std::env::var("IN_APP_FEED_URL").ok(),
        })
    }
}
