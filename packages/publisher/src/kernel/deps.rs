//! Publisher dependencies
//!
//! The pool and the id generator are created once per process and passed
//! explicitly to every publication.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::common::{SnowflakeGenerator, UserId};
use crate::config::Config;

#[derive(Clone)]
pub struct PublisherDeps {
    pub db_pool: PgPool,
    pub ids: Arc<SnowflakeGenerator>,
    pub blog_base_url: Option<String>,
    pub default_user_id: UserId,
    /// Handle used in `published_url` when a payload names no author
    pub default_username: String,
}

impl PublisherDeps {
    pub fn new(
        db_pool: PgPool,
        ids: Arc<SnowflakeGenerator>,
        blog_base_url: Option<String>,
        default_user_id: UserId,
        default_username: String,
    ) -> Self {
        Self {
            db_pool,
            ids,
            blog_base_url,
            default_user_id,
            default_username,
        }
    }

    /// Connect the pool and build the generator from configuration
    pub async fn connect(config: &Config) -> Result<Self> {
        let ids = SnowflakeGenerator::new(config.snowflake_worker_id)
            .context("Invalid SNOWFLAKE_WORKER_ID")?;

        let db_pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("Failed to connect to database")?;

        info!(
            worker_id = config.snowflake_worker_id,
            max_connections = config.database_max_connections,
            "Publisher dependencies ready"
        );

        Ok(Self::new(
            db_pool,
            Arc::new(ids),
            config.blog_base_url.clone(),
            config.default_user_id,
            config.default_username.clone(),
        ))
    }

    /// Run pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    /// Public URL of a published post. Needs a configured blog base URL;
    /// a missing handle falls back to `default_username`.
    pub fn published_url(&self, username: Option<&str>, slug: &str) -> Option<String> {
        let base = self.blog_base_url.as_deref()?;
        let username = username
            .filter(|name| !name.is_empty())
            .unwrap_or(self.default_username.as_str());
        Some(format!("{}/blog/@{}/{}", base, username, slug))
    }
}
