//! Migration runners used to seed the root template.

use std::path::Path;

use async_trait::async_trait;
use sqlx::migrate::Migrator as SqlxMigratorInner;
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::error::Result;

/// Applies the base schema to a freshly created, empty database.
///
/// Runs exactly once per root template per process run.
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn migrate(&self, pool: &PgPool) -> Result<()>;
}

/// Wraps a `sqlx::migrate::Migrator`.
///
/// Use with `sqlx::migrate!()` for embedded migrations or
/// [`SqlxMigrator::from_dir`] to read them at runtime.
#[derive(Debug)]
pub struct SqlxMigrator(SqlxMigratorInner);

impl SqlxMigrator {
    pub fn new(migrator: SqlxMigratorInner) -> Self {
        Self(migrator)
    }

    /// Load migrations from a directory of `.sql` files.
    pub async fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let migrator = SqlxMigratorInner::new(path.as_ref()).await?;
        Ok(Self(migrator))
    }
}

#[async_trait]
impl Migrator for SqlxMigrator {
    #[instrument(skip_all, err)]
    async fn migrate(&self, pool: &PgPool) -> Result<()> {
        self.0.run(pool).await?;
        Ok(())
    }
}

/// Ordered raw SQL statements, one `execute` per entry.
#[derive(Debug, Clone, Default)]
pub struct StatementMigrator {
    statements: Vec<String>,
}

impl StatementMigrator {
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Migrator for StatementMigrator {
    #[instrument(skip_all, err)]
    async fn migrate(&self, pool: &PgPool) -> Result<()> {
        for statement in &self.statements {
            debug!(statement = %statement, "Applying schema statement");
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }
}

/// Leaves the root template empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMigrations;

#[async_trait]
impl Migrator for NoMigrations {
    async fn migrate(&self, _pool: &PgPool) -> Result<()> {
        Ok(())
    }
}
