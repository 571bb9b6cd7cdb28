use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub cache_ttl_days: i64,
    pub scraper_max_retries: u32,
    pub email_max_retries: u32,
    pub poll_interval_seconds: u64,
    pub cleanup_retention_days: i64,
    pub scraper_command: String,
    pub analysis_command: String,
    pub email_endpoint: String,
    pub data_root: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            cache_ttl_days: parse_var("CACHE_TTL_DAYS", 7)?,
            scraper_max_retries: parse_var("SCRAPER_MAX_RETRIES", 2)?,
            email_max_retries: parse_var("EMAIL_MAX_RETRIES", 3)?,
            poll_interval_seconds: parse_var("POLL_INTERVAL_SECONDS", 10)?,
            cleanup_retention_days: parse_var("CLEANUP_RETENTION_DAYS", 7)?,
            scraper_command: env::var("SCRAPER_COMMAND").context("SCRAPER_COMMAND must be set")?,
            analysis_command: env::var("ANALYSIS_COMMAND")
                .context("ANALYSIS_COMMAND must be set")?,
            email_endpoint: env::var("EMAIL_ENDPOINT").context("EMAIL_ENDPOINT must be set")?,
            data_root: env::var("DATA_ROOT").unwrap_or_else(|_| "data/jobs".to_string()),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}
