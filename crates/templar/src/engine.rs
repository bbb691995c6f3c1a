//! Connection pool factory and administrative statement execution.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::config::IsolationConfig;
use crate::error::Result;
use crate::naming::redact;

/// Opens and closes pools and runs administrative SQL.
///
/// The manager builds every `CREATE DATABASE` / `DROP DATABASE` statement and
/// runs it through the default pool via [`DatabaseEngine::execute`].
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    /// Open a pool against `url`.
    async fn open(&self, url: &str) -> Result<PgPool>;

    /// Close a pool, waiting for its connections to be released.
    async fn close(&self, pool: PgPool);

    /// Execute a statement that returns no rows.
    async fn execute(&self, pool: &PgPool, statement: &str) -> Result<()>;
}

/// PostgreSQL engine backed by sqlx pools.
#[derive(Debug, Clone)]
pub struct PgEngine {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgEngine {
    pub fn new(max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            max_connections,
            acquire_timeout,
        }
    }

    pub fn from_config(config: &IsolationConfig) -> Self {
        Self::new(config.max_connections, config.acquire_timeout)
    }
}

#[async_trait]
impl DatabaseEngine for PgEngine {
    #[instrument(skip_all, err)]
    async fn open(&self, url: &str) -> Result<PgPool> {
        debug!(url = %redact(url), "Opening pool");
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(url)
            .await?;
        Ok(pool)
    }

    async fn close(&self, pool: PgPool) {
        pool.close().await;
    }

    #[instrument(skip(self, pool), err)]
    async fn execute(&self, pool: &PgPool, statement: &str) -> Result<()> {
        sqlx::query(statement).execute(pool).await?;
        Ok(())
    }
}
