//! Templar: per-test PostgreSQL databases cloned from cached templates.
//!
//! Every test gets its own physical database created with
//! `CREATE DATABASE .. TEMPLATE ..` from a template that is migrated (and
//! optionally seeded with fixtures) once per process. Connections are routed
//! to the test's database through an explicit [`TestContext`].
//!
//! # Features
//!
//! - `docker-tests`: Enable integration tests that need a PostgreSQL container
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use templar::{IsolationConfig, LifecycleDriver, SqlxMigrator, TemplateConfiguration, TemplateManager};
//!
//! #[tokio::test]
//! async fn test_orders() {
//!     let migrator = SqlxMigrator::from_dir("./migrations").await.unwrap();
//!     let manager = TemplateManager::connect(IsolationConfig::from_env().unwrap(), migrator).unwrap();
//!     let driver = LifecycleDriver::new(Arc::new(manager));
//!
//!     driver
//!         .run(TemplateConfiguration::NoAddedFixtures, |session| async move {
//!             session.execute("INSERT INTO orders (id) VALUES (1)").await?;
//!             Ok(())
//!         })
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod header;
pub mod lifecycle;
pub mod manager;
pub mod migrate;
pub mod naming;
pub mod registry;
pub mod routing;
pub mod state;
pub mod suffix;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::IsolationConfig;
pub use context::TestContext;
pub use engine::{DatabaseEngine, PgEngine};
pub use error::{IsolationError, Result};
pub use header::{HeaderScope, TEST_DB_HEADER};
pub use lifecycle::{LifecycleDriver, TestHooks, TestSession};
pub use manager::{TemplateManager, DEFAULT};
pub use migrate::{Migrator, NoMigrations, SqlxMigrator, StatementMigrator};
pub use naming::DatabaseUrl;
pub use registry::TemplateRegistry;
pub use routing::RoutingLookup;
pub use state::{DatabaseConfigurationState, FixtureGenerator, TemplateConfiguration};
pub use suffix::SuffixSupplier;
pub use templar_ids::TemplateId;
