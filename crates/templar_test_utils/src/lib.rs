//! Templar Test Utilities
//!
//! Docker-based PostgreSQL servers for the isolated-database integration tests.
//!
//! # Features
//!
//! - `docker-tests`: Enable tests that require Docker containers
//!
//! # Usage
//!
//! ```rust,ignore
//! use templar_test_utils::{DbVersion, TestPgServer};
//!
//! #[tokio::test]
//! #[cfg(feature = "docker-tests")]
//! async fn test_against_postgres() {
//!     let server = TestPgServer::start(DbVersion::from_env()).await.unwrap();
//!     let url = server.database_url();
//!     // configure the template manager with `url`
//!     assert!(server.database_exists("templar_app").await.unwrap());
//! }
//! ```
//!
//! Set `TEMPLAR_TEST_EXTERNAL_PG` to skip compose and use a server that is
//! already listening on the version's port.

pub mod config;
pub mod containers;
pub mod server;

// Re-exports for convenience
pub use config::{DbVersion, TestDbConfig};
pub use containers::lifecycle::{ensure_server_running, stop_all_servers, wait_for_ready};
pub use server::TestPgServer;
