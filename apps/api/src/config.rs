use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub firecrawl_api_key: String,
    pub firecrawl_base_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Worker poll cadence while jobs are flowing.
    pub worker_poll_interval: Duration,
    /// Ceiling for the worker's idle backoff.
    pub worker_max_idle_interval: Duration,
    /// Cadence of the cleanup sweep.
    pub cleanup_interval: Duration,
    /// How long terminal jobs are retained before the sweep deletes them.
    pub job_retention: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            firecrawl_api_key: require_env("FIRECRAWL_API_KEY")?,
            firecrawl_base_url: std::env::var("FIRECRAWL_BASE_URL")
                .unwrap_or_else(|_| "https://api.firecrawl.dev".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            worker_poll_interval: Duration::from_secs(env_u64("WORKER_POLL_INTERVAL_SECS", 2)?),
            worker_max_idle_interval: Duration::from_secs(env_u64(
                "WORKER_MAX_IDLE_INTERVAL_SECS",
                10,
            )?),
            cleanup_interval: Duration::from_secs(
                env_u64("JOB_CLEANUP_INTERVAL_HOURS", 6)? * 3600,
            ),
            job_retention: chrono::Duration::hours(env_u64("JOB_RETENTION_HOURS", 72)? as i64),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .with_context(|| format!("'{key}' must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}
