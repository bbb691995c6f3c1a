//! Handle on a running PostgreSQL test server.

use crate::config::{DbVersion, TestDbConfig};
use crate::containers::lifecycle::ensure_server_running;
use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// A PostgreSQL server ready for isolated-database tests.
///
/// Holds an admin pool on the `postgres` maintenance database so tests can
/// inspect which databases exist without attaching to them (an attached
/// session would block cloning a template).
#[derive(Debug, Clone)]
pub struct TestPgServer {
    pub config: TestDbConfig,
    admin: PgPool,
}

impl TestPgServer {
    /// Start (or reuse) the server for `version` and wait until it is ready.
    ///
    /// ```rust,ignore
    /// let server = TestPgServer::start(DbVersion::Postgres16).await.unwrap();
    /// let config = IsolationConfig::new(server.database_url());
    /// ```
    pub async fn start(version: DbVersion) -> Result<Self> {
        let config = TestDbConfig::new(version);
        ensure_server_running(&config).await?;

        info!(version = %version, port = version.port(), "Connecting admin pool");
        let admin = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.url_for("postgres"))
            .await?;

        Ok(Self { config, admin })
    }

    /// URL of the base database tests should configure the manager with.
    pub fn database_url(&self) -> String {
        self.config.database_url()
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(name)
            .fetch_optional(&self.admin)
            .await?;
        Ok(found.is_some())
    }

    /// Names of databases starting with `prefix`, sorted.
    pub async fn databases_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT datname FROM pg_database WHERE starts_with(datname, $1) ORDER BY datname",
        )
        .bind(prefix)
        .fetch_all(&self.admin)
        .await?;
        Ok(names)
    }

    /// Execute a statement on the maintenance database.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.admin).await?;
        Ok(())
    }

    pub fn admin(&self) -> &PgPool {
        &self.admin
    }
}
