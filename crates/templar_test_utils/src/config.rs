//! Server versions and connection settings for the test containers.

use std::fmt;

/// PostgreSQL server versions the integration suite runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbVersion {
    Postgres14,
    Postgres15,
    Postgres16,
}

impl DbVersion {
    /// Get the docker-compose service name for this version.
    pub fn service_name(&self) -> &'static str {
        match self {
            DbVersion::Postgres14 => "postgres14",
            DbVersion::Postgres15 => "postgres15",
            DbVersion::Postgres16 => "postgres16",
        }
    }

    /// Get the host port for this version.
    pub fn port(&self) -> u16 {
        match self {
            DbVersion::Postgres14 => 25432,
            DbVersion::Postgres15 => 25433,
            DbVersion::Postgres16 => 25434,
        }
    }

    pub fn all() -> &'static [DbVersion] {
        &[
            DbVersion::Postgres14,
            DbVersion::Postgres15,
            DbVersion::Postgres16,
        ]
    }

    /// Version named by `TEMPLAR_TEST_PG_VERSION` (`14`, `15` or `16`), else 16.
    pub fn from_env() -> Self {
        match std::env::var("TEMPLAR_TEST_PG_VERSION").as_deref().map(str::trim) {
            Ok("14") => DbVersion::Postgres14,
            Ok("15") => DbVersion::Postgres15,
            _ => DbVersion::Postgres16,
        }
    }
}

impl fmt::Display for DbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbVersion::Postgres14 => write!(f, "PostgreSQL 14"),
            DbVersion::Postgres15 => write!(f, "PostgreSQL 15"),
            DbVersion::Postgres16 => write!(f, "PostgreSQL 16"),
        }
    }
}

/// Connection settings matching `docker/docker-compose.yml`.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    pub version: DbVersion,
    /// Host (defaults to localhost)
    pub host: String,
    /// Base database the suite connects to (defaults to templar_app)
    pub database: String,
    pub username: String,
    pub password: String,
}

impl TestDbConfig {
    /// Create a config for the given version with the compose credentials.
    pub fn new(version: DbVersion) -> Self {
        Self {
            version,
            host: "localhost".to_string(),
            database: "templar_app".to_string(),
            username: "templar".to_string(),
            password: "templar_test".to_string(),
        }
    }

    /// URL of the base database.
    pub fn database_url(&self) -> String {
        self.url_for(&self.database)
    }

    /// URL of another database on the same server.
    pub fn url_for(&self, database: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username,
            self.password,
            self.host,
            self.version.port(),
            database
        )
    }
}
