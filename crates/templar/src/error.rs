//! Error types for the isolation layer.

use templar_ids::{IdParseError, TemplateId};
use thiserror::Error;

/// Isolation operation result type.
pub type Result<T> = std::result::Result<T, IsolationError>;

/// Errors raised while building, routing to, or tearing down test databases.
///
/// None of these are retried: a failure is fatal to the requesting test.
#[derive(Error, Debug)]
pub enum IsolationError {
    /// Malformed template id
    #[error("Invalid template id: {0}")]
    InvalidTemplateId(#[from] IdParseError),

    /// A template configuration was routed before its template was built
    #[error("No such template: {0} (initialize_test_db must run first)")]
    NoSuchTemplate(TemplateId),

    /// The template exists but is detached so it can serve as a clone source
    #[error("Template {id} ({name}) is detached and cannot be connected to")]
    TemplateDetached { id: TemplateId, name: String },

    /// Cleanup requested for something that is not a per-test database
    #[error("Invalid cleanup target: {0}")]
    InvalidCleanupTarget(String),

    /// The configured connection URL cannot have its database name substituted
    #[error("Database URL did not match expected pattern: {0}")]
    UrlPatternMismatch(String),

    /// SQLx error (connection, create/drop/clone database, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration runner failure while seeding the root template
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Caller supplied fixture initializer failed
    #[error("Fixture initialization failed for template {template}: {source}")]
    Fixture {
        template: String,
        #[source]
        source: anyhow::Error,
    },

    /// Unexpected context state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Bad configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IsolationError {
    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid cleanup target error.
    pub fn invalid_cleanup(msg: impl Into<String>) -> Self {
        Self::InvalidCleanupTarget(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
