use anyhow::{Context, Result};

/// Gateway configuration loaded from environment variables.
/// Every downstream service URL has a local-dev default so the gateway
/// starts with zero configuration on a developer machine.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub auth_service_url: String,
    pub user_service_url: String,
    pub cv_service_url: String,
    pub export_service_url: String,
    pub ai_service_url: String,
    pub payment_service_url: String,
    /// Seconds between background health sweeps.
    pub health_interval_secs: u64,
    /// Per-probe timeout for health checks.
    pub probe_timeout_secs: u64,
    /// Deadline for a single proxied request.
    pub proxy_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            auth_service_url: env_or("AUTH_SERVICE_URL", "http://localhost:3001"),
            user_service_url: env_or("USER_SERVICE_URL", "http://localhost:3002"),
            cv_service_url: env_or("CV_SERVICE_URL", "http://localhost:3003"),
            export_service_url: env_or("EXPORT_SERVICE_URL", "http://localhost:3004"),
            ai_service_url: env_or("AI_SERVICE_URL", "http://localhost:3005"),
            payment_service_url: env_or("PAYMENT_SERVICE_URL", "http://localhost:3006"),
            health_interval_secs: parse_env_or("HEALTH_INTERVAL_SECS", 60)?,
            probe_timeout_secs: parse_env_or("PROBE_TIMEOUT_SECS", 10)?,
            proxy_timeout_secs: parse_env_or("PROXY_TIMEOUT_SECS", 30)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env_or(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be a positive integer")),
        Err(_) => Ok(default),
    }
}
