//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container per test binary, started and migrated on first use.
//! Tests isolate their rows by publishing under a fresh owner id.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use publisher_core::common::{SnowflakeGenerator, UserId};
use publisher_core::kernel::PublisherDeps;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

pub const TEST_BLOG_URL: &str = "https://blog.example.com";
pub const TEST_DEFAULT_USERNAME: &str = "editor";

/// Shared test infrastructure that persists across all tests of a binary.
struct SharedTestInfra {
    db_url: String,
    ids: Arc<SnowflakeGenerator>,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=publisher_core=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        let ids = SnowflakeGenerator::new(900).context("Invalid test worker id")?;

        Ok(Self {
            db_url,
            ids: Arc::new(ids),
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Per-test context: a fresh pool, the shared id generator and a fresh owner.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let result = publish(ctx.payload("hello"), &ctx.deps).await.unwrap();
/// }
/// ```
pub struct TestHarness {
    pub db_pool: PgPool,
    pub deps: PublisherDeps,
    /// Owner no other test publishes under.
    pub owner: UserId,
    db_url: String,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new()
            .await
            .expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        let owner: UserId = infra.ids.next().context("Failed to mint owner id")?;
        let deps = PublisherDeps::new(
            db_pool.clone(),
            infra.ids.clone(),
            Some(TEST_BLOG_URL.to_string()),
            owner,
            TEST_DEFAULT_USERNAME.to_string(),
        );

        Ok(Self {
            db_pool,
            deps,
            owner,
            db_url: infra.db_url.clone(),
        })
    }

    pub fn ids(&self) -> &SnowflakeGenerator {
        &self.deps.ids
    }

    /// Dependencies backed by a dedicated single-connection pool whose
    /// sessions are tagged with `application_name`, so a test can terminate
    /// them from the outside.
    pub async fn tagged_deps(&self, application_name: &str) -> Result<PublisherDeps> {
        let options = PgConnectOptions::from_str(&self.db_url)?.application_name(application_name);
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect tagged pool")?;

        Ok(PublisherDeps::new(
            pool,
            self.deps.ids.clone(),
            self.deps.blog_base_url.clone(),
            self.owner,
            self.deps.default_username.clone(),
        ))
    }

    /// Terminate every backend that connected with `application_name` and
    /// wait for them to exit.
    pub async fn terminate_sessions(&self, application_name: &str) -> Result<i64> {
        let terminated = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM (
                SELECT pg_terminate_backend(pid, 5000)
                FROM pg_stat_activity
                WHERE application_name = $1
            ) t
            "#,
        )
        .bind(application_name)
        .fetch_one(&self.db_pool)
        .await?;
        Ok(terminated)
    }
}
