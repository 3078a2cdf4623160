use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::common::UserId;

/// Publisher configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Node discriminator baked into every generated id (0..=1023)
    pub snowflake_worker_id: u16,
    /// Base URL of the public blog; without it no `published_url` is produced
    pub blog_base_url: Option<String>,
    /// Owner used when a payload carries no `user_id`
    pub default_user_id: UserId,
    /// Handle used in `published_url` when a payload names neither a
    /// username nor an author
    pub default_username: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
            snowflake_worker_id: env::var("SNOWFLAKE_WORKER_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("SNOWFLAKE_WORKER_ID must be a number between 0 and 1023")?,
            blog_base_url: env::var("BLOG_BASE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            default_user_id: env::var("DEFAULT_USER_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse::<i64>()
                .map(UserId::from_i64)
                .context("DEFAULT_USER_ID must be a valid number")?,
            default_username: env::var("DEFAULT_USERNAME")
                .ok()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "admin".to_string()),
        })
    }
}
