//! Isolation configuration.

use std::time::Duration;

use crate::error::{IsolationError, Result};

/// Environment variable holding the base connection URL.
pub const ENV_DATABASE_URL: &str = "TEMPLAR_DATABASE_URL";
/// Environment variable overriding the root template database name.
pub const ENV_TEMPLATE_DBNAME: &str = "TEMPLAR_TEMPLATE_DBNAME";
/// Environment variable controlling whether per-test databases are dropped.
pub const ENV_DROP_TEST_DBS: &str = "TEMPLAR_DROP_TEST_DBS";
/// Environment variable for the per-database pool size.
pub const ENV_MAX_CONNECTIONS: &str = "TEMPLAR_MAX_CONNECTIONS";

/// Longest root template name taken from an operator override.
pub(crate) const TEMPLATE_DBNAME_MAX_LEN: usize = 20;

/// Configuration for the template manager.
#[derive(Debug, Clone)]
pub struct IsolationConfig {
    /// Connection URL of the base (default) database
    pub database_url: String,
    /// Operator supplied root template name
    pub template_db_name: Option<String>,
    /// Drop per-test databases on cleanup (defaults to true)
    pub drop_test_databases: bool,
    /// Maximum connections per opened pool
    pub max_connections: u32,
    /// Pool acquire timeout
    pub acquire_timeout: Duration,
}

impl IsolationConfig {
    /// Create a config for the given base database URL with defaults.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            template_db_name: None,
            drop_test_databases: true,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    /// Read configuration from `TEMPLAR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(ENV_DATABASE_URL).map_err(|_| {
            IsolationError::config(format!(
                "{} not set. Set it explicitly for isolated database tests.",
                ENV_DATABASE_URL
            ))
        })?;

        let mut config = Self::new(url);

        if let Ok(name) = std::env::var(ENV_TEMPLATE_DBNAME) {
            config = config.with_template_db_name(name);
        }

        if let Ok(value) = std::env::var(ENV_DROP_TEST_DBS) {
            config.drop_test_databases = parse_bool(&value).ok_or_else(|| {
                IsolationError::config(format!("{}: expected true/false, got {value}", ENV_DROP_TEST_DBS))
            })?;
        }

        if let Ok(value) = std::env::var(ENV_MAX_CONNECTIONS) {
            config.max_connections = value.trim().parse().map_err(|_| {
                IsolationError::config(format!("{}: expected a number, got {value}", ENV_MAX_CONNECTIONS))
            })?;
        }

        Ok(config)
    }

    /// Set the root template name. Blank values clear the override.
    pub fn with_template_db_name(mut self, name: impl AsRef<str>) -> Self {
        let trimmed = name.as_ref().trim();
        self.template_db_name = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.chars().take(TEMPLATE_DBNAME_MAX_LEN).collect())
        };
        self
    }

    /// Keep per-test databases after cleanup (useful for post-mortem debugging).
    pub fn retain_test_databases(mut self) -> Self {
        self.drop_test_databases = false;
        self
    }

    /// Set maximum connections per pool.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the pool acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
