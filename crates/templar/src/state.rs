//! Database configuration states shared by the manager, routing lookup and
//! lifecycle driver.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use templar_ids::TemplateId;

/// Populates a freshly created template database with fixture rows.
///
/// Templates are built at most once per process run and reused by every test
/// that asks for the same [`TemplateId`], so an id must always describe the
/// same fixture content. After `initialize` returns, the pool is closed and
/// the database becomes a clone source.
#[async_trait]
pub trait FixtureGenerator: Send + Sync {
    /// Identity of the fixture set this generator produces.
    fn template_id(&self) -> TemplateId;

    /// Load fixtures into `template_name` through `pool`.
    ///
    /// The database already contains the migrated base schema.
    async fn initialize(&self, template_name: &str, pool: &PgPool) -> anyhow::Result<()>;
}

/// Request for a kind of template.
#[derive(Clone)]
pub enum TemplateConfiguration {
    /// Root template plus the rows loaded by the generator.
    FixtureGenerator(Arc<dyn FixtureGenerator>),
    /// Root template unmodified.
    NoAddedFixtures,
}

impl TemplateConfiguration {
    /// Wrap a generator.
    pub fn fixtures(generator: impl FixtureGenerator + 'static) -> Self {
        Self::FixtureGenerator(Arc::new(generator))
    }
}

impl fmt::Debug for TemplateConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixtureGenerator(generator) => f
                .debug_tuple("FixtureGenerator")
                .field(&generator.template_id().as_str())
                .finish(),
            Self::NoAddedFixtures => write!(f, "NoAddedFixtures"),
        }
    }
}

// Generators are compared by the identity they promise.
impl PartialEq for TemplateConfiguration {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::FixtureGenerator(a), Self::FixtureGenerator(b)) => {
                a.template_id() == b.template_id()
            }
            (Self::NoAddedFixtures, Self::NoAddedFixtures) => true,
            _ => false,
        }
    }
}

/// Which database the current test is using.
///
/// Only `IsolatedTestTemplate` may be used to open a connection for a running
/// test or be handed to cleanup; the other variants are request states.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DatabaseConfigurationState {
    /// No database requested yet.
    #[default]
    Uninitialized,
    /// A template has been requested and may still be under construction.
    Template(TemplateConfiguration),
    /// A materialized per-test database, ready for use.
    IsolatedTestTemplate(String),
}

impl DatabaseConfigurationState {
    pub fn isolated(db_name: impl Into<String>) -> Self {
        Self::IsolatedTestTemplate(db_name.into())
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::IsolatedTestTemplate(_))
    }

    /// Name of the per-test database, if materialized.
    pub fn isolated_db_name(&self) -> Option<&str> {
        match self {
            Self::IsolatedTestTemplate(name) => Some(name),
            Self::Uninitialized | Self::Template(_) => None,
        }
    }
}

impl From<TemplateConfiguration> for DatabaseConfigurationState {
    fn from(config: TemplateConfiguration) -> Self {
        Self::Template(config)
    }
}

impl fmt::Display for DatabaseConfigurationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Template(TemplateConfiguration::NoAddedFixtures) => write!(f, "template(root)"),
            Self::Template(TemplateConfiguration::FixtureGenerator(g)) => {
                write!(f, "template({})", g.template_id())
            }
            Self::IsolatedTestTemplate(name) => write!(f, "isolated({})", name),
        }
    }
}
