//! Template and per-test database lifecycle.
//!
//! Built templates are recorded in a [`TemplateRegistry`] shared by every
//! manager in the process that targets the same server and root template
//! (`TemplateId -> database name`, recorded once a template has been fully
//! built and detached so it can be cloned from). Each manager keeps its own
//! pools (`database name -> PgPool`) for the default database, templates it is
//! building, and live per-test databases.
//!
//! Templates are created at most once per identity. Lookups are optimistic;
//! only a miss takes the registry's build lock, and the registry is checked
//! again under it before anything is created.
//!
//! Cloning uses `CREATE DATABASE .. TEMPLATE ..`, which requires that nothing
//! is connected to the source database. That is why template pools are closed
//! as soon as migrations or fixtures have been applied.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlx::PgPool;
use templar_ids::TemplateId;
use tracing::{debug, info};

use crate::config::{IsolationConfig, TEMPLATE_DBNAME_MAX_LEN};
use crate::context::TestContext;
use crate::engine::{DatabaseEngine, PgEngine};
use crate::error::{IsolationError, Result};
use crate::migrate::Migrator;
use crate::naming::{quote_ident, DatabaseUrl};
use crate::registry::TemplateRegistry;
use crate::state::{DatabaseConfigurationState, FixtureGenerator, TemplateConfiguration};
use crate::suffix::SuffixSupplier;

/// Pool registry key of the configured base database.
pub const DEFAULT: &str = "default";

/// What gets loaded into a template right after it is created.
enum Seed<'a> {
    /// Base schema via the migrator (root template only).
    Schema,
    /// Caller fixtures on top of a clone of the root template.
    Fixtures(&'a dyn FixtureGenerator),
}

/// Creates template databases and unique per-test databases, and tracks
/// every pool opened against them.
pub struct TemplateManager {
    config: IsolationConfig,
    url: DatabaseUrl,
    root_template_id: TemplateId,
    engine: Arc<dyn DatabaseEngine>,
    migrator: Arc<dyn Migrator>,
    suffixes: SuffixSupplier,
    registry: Arc<TemplateRegistry>,
    pools: RwLock<HashMap<String, PgPool>>,
    /// Templates whose pool is attached while migrations/fixtures run.
    building: RwLock<HashMap<TemplateId, String>>,
}

impl TemplateManager {
    /// Create a manager.
    ///
    /// Fails if the configured URL has no substitutable database name or the
    /// root template name is not a valid template id. Root names longer than
    /// 20 characters are truncated so every derived name fits PostgreSQL's
    /// 63-byte identifier limit.
    ///
    /// Managers for the same server and root template share one
    /// process-wide [`TemplateRegistry`].
    pub fn new(
        config: IsolationConfig,
        engine: Arc<dyn DatabaseEngine>,
        migrator: Arc<dyn Migrator>,
    ) -> Result<Self> {
        let url = DatabaseUrl::parse(&config.database_url)?;
        let root_name = match config.template_db_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.chars().take(TEMPLATE_DBNAME_MAX_LEN).collect(),
            _ => url.default_root_template_name(),
        };
        let root_template_id = TemplateId::new(root_name)?;
        let registry = TemplateRegistry::shared(&format!("{}/{}", url.server(), root_template_id));

        info!(
            base = %url.database_name(),
            root_template = %root_template_id,
            drop_test_databases = config.drop_test_databases,
            "Template manager configured"
        );

        Ok(Self {
            config,
            url,
            root_template_id,
            engine,
            migrator,
            suffixes: SuffixSupplier::new(),
            registry,
            pools: RwLock::new(HashMap::new()),
            building: RwLock::new(HashMap::new()),
        })
    }

    /// Manager backed by sqlx PostgreSQL pools.
    pub fn connect(config: IsolationConfig, migrator: impl Migrator + 'static) -> Result<Self> {
        let engine = PgEngine::from_config(&config);
        Self::new(config, Arc::new(engine), Arc::new(migrator))
    }

    /// Replace the suffix supplier (deterministic names in tests).
    pub fn with_suffix_supplier(mut self, suffixes: SuffixSupplier) -> Self {
        self.suffixes = suffixes;
        self
    }

    /// Record built templates in `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: Arc<TemplateRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    /// Identity of the root template every test descends from.
    pub fn root_template_id(&self) -> &TemplateId {
        &self.root_template_id
    }

    /// Database name recorded for a fully built template.
    pub fn template_name(&self, id: &TemplateId) -> Option<String> {
        self.registry.get(id)
    }

    /// Build (or reuse) the templates `config` needs, then clone a unique
    /// per-test database from them.
    ///
    /// `ctx` holds the requested template while it is being built, so
    /// connections acquired by fixture code route to it, and holds the new
    /// per-test database afterwards. Returns `IsolatedTestTemplate`.
    pub async fn initialize_test_db(
        &self,
        ctx: &TestContext,
        config: TemplateConfiguration,
    ) -> Result<DatabaseConfigurationState> {
        let template_id = self.template_id(&config);
        debug!(template_id = %template_id, "Setting test context to requested template");
        ctx.set(DatabaseConfigurationState::Template(config.clone()));

        // Base schema first; every other template is cloned from it
        let root_name = self
            .get_name_and_maybe_create(self.root_template_id.clone(), None, Seed::Schema)
            .await?;

        let template_name = match &config {
            TemplateConfiguration::NoAddedFixtures => root_name,
            TemplateConfiguration::FixtureGenerator(generator) => {
                self.get_name_and_maybe_create(
                    template_id,
                    Some(&root_name),
                    Seed::Fixtures(generator.as_ref()),
                )
                .await?
            }
        };

        let test_db = self.create_unique_temporary_db(&template_name).await?;

        debug!(database = %test_db, "Setting test context to isolated database");
        let state = DatabaseConfigurationState::IsolatedTestTemplate(test_db);
        ctx.set(state.clone());
        Ok(state)
    }

    /// Name of the database `state` routes to, opening a pool for it if none
    /// exists yet.
    pub async fn ensure_datasource(&self, state: &DatabaseConfigurationState) -> Result<String> {
        let db_name = match state {
            DatabaseConfigurationState::Template(config) => {
                let template_id = self.template_id(config);
                debug!(template_id = %template_id, "Obtaining template setup connection");
                self.routable_template(&template_id)?
            }
            DatabaseConfigurationState::Uninitialized => DEFAULT.to_string(),
            DatabaseConfigurationState::IsolatedTestTemplate(name) => name.clone(),
        };

        self.ensure_pool(&db_name).await?;
        debug!(database = %db_name, "Computed context database name");
        Ok(db_name)
    }

    /// Close the pool of a per-test database and drop it.
    ///
    /// The default database and templates live for the whole process and are
    /// rejected without side effects.
    pub async fn clean_up(&self, state: &DatabaseConfigurationState) -> Result<()> {
        let db_name = match state {
            DatabaseConfigurationState::Uninitialized => {
                return Err(IsolationError::invalid_cleanup(
                    "cannot clean up the default database",
                ))
            }
            DatabaseConfigurationState::Template(config) => {
                return Err(IsolationError::invalid_cleanup(format!(
                    "clean up of templates is not supported ({})",
                    self.template_id(config)
                )))
            }
            DatabaseConfigurationState::IsolatedTestTemplate(name) => name,
        };

        if db_name == DEFAULT || self.is_template_name(db_name) {
            return Err(IsolationError::invalid_cleanup(format!(
                "{} is not a per-test database",
                db_name
            )));
        }

        debug!(database = %db_name, "Cleaning up");
        match self.take_pool(db_name) {
            Some(pool) => self.engine.close(pool).await,
            None => info!(database = %db_name, "A pool was never requested"),
        }

        if self.config.drop_test_databases {
            let default = self.ensure_pool(DEFAULT).await?;
            self.engine
                .execute(
                    &default,
                    &format!("DROP DATABASE IF EXISTS {}", quote_ident(db_name)),
                )
                .await?;
            debug!(database = %db_name, "Dropped test database");
        } else {
            info!(database = %db_name, "Retaining test database");
        }

        Ok(())
    }

    /// Snapshot of every routable pool keyed by database name.
    pub fn target_data_source_map(&self) -> HashMap<String, PgPool> {
        read(&self.pools).clone()
    }

    /// Close every registered pool, including the default one.
    pub async fn close(&self) {
        let pools: Vec<(String, PgPool)> = write(&self.pools).drain().collect();
        for (name, pool) in pools {
            debug!(database = %name, "Closing pool");
            self.engine.close(pool).await;
        }
    }

    fn template_id(&self, config: &TemplateConfiguration) -> TemplateId {
        match config {
            TemplateConfiguration::FixtureGenerator(generator) => generator.template_id(),
            TemplateConfiguration::NoAddedFixtures => self.root_template_id.clone(),
        }
    }

    /// A template can only be connected to while it is being built.
    fn routable_template(&self, id: &TemplateId) -> Result<String> {
        if let Some(name) = read(&self.building).get(id) {
            return Ok(name.clone());
        }
        match self.registry.get(id) {
            Some(name) => Err(IsolationError::TemplateDetached {
                id: id.clone(),
                name,
            }),
            None => Err(IsolationError::NoSuchTemplate(id.clone())),
        }
    }

    fn is_template_name(&self, db_name: &str) -> bool {
        self.registry.contains_name(db_name)
            || read(&self.building).values().any(|n| n == db_name)
    }

    async fn get_name_and_maybe_create(
        &self,
        id: TemplateId,
        base: Option<&str>,
        seed: Seed<'_>,
    ) -> Result<String> {
        if let Some(name) = self.template_name(&id) {
            return Ok(name);
        }

        let _guard = self.registry.lock_builds().await;
        if let Some(name) = self.template_name(&id) {
            return Ok(name);
        }

        let name = self.create_template_db(&id, base, seed).await?;
        self.registry.record(id, name.clone());
        Ok(name)
    }

    async fn create_template_db(
        &self,
        id: &TemplateId,
        base: Option<&str>,
        seed: Seed<'_>,
    ) -> Result<String> {
        let name = match base {
            Some(base) => format!("{}_{}", base, id),
            None => id.to_string(),
        };
        let create = match base {
            Some(base) => format!(
                "CREATE DATABASE {} TEMPLATE {}",
                quote_ident(&name),
                quote_ident(base)
            ),
            None => format!("CREATE DATABASE {}", quote_ident(&name)),
        };

        // A template left over from an earlier run may hold stale fixtures
        let default = self.ensure_pool(DEFAULT).await?;
        self.engine
            .execute(&default, &format!("DROP DATABASE IF EXISTS {}", quote_ident(&name)))
            .await?;
        self.engine.execute(&default, &create).await?;

        let pool = self.engine.open(&self.url.with_database(&name)).await?;
        write(&self.pools).insert(name.clone(), pool.clone());
        write(&self.building).insert(id.clone(), name.clone());

        let seeded = match seed {
            Seed::Schema => self.migrator.migrate(&pool).await,
            Seed::Fixtures(generator) => generator
                .initialize(&name, &pool)
                .await
                .map_err(|source| IsolationError::Fixture {
                    template: name.clone(),
                    source,
                }),
        };

        // Detach before anything can clone from it, whether or not seeding worked
        write(&self.building).remove(id);
        drop(pool);
        if let Some(pool) = self.take_pool(&name) {
            self.engine.close(pool).await;
        }
        seeded?;

        info!(template = %name, template_id = %id, "Initialized template");
        Ok(name)
    }

    async fn create_unique_temporary_db(&self, template: &str) -> Result<String> {
        let default = self.ensure_pool(DEFAULT).await?;
        let name = format!("{}_{}", template, self.suffixes.next());

        self.engine
            .execute(&default, &format!("DROP DATABASE IF EXISTS {}", quote_ident(&name)))
            .await?;
        self.engine
            .execute(
                &default,
                &format!(
                    "CREATE DATABASE {} TEMPLATE {}",
                    quote_ident(&name),
                    quote_ident(template)
                ),
            )
            .await?;

        debug!(database = %name, template = %template, "Created unique database");
        Ok(name)
    }

    async fn ensure_pool(&self, db_name: &str) -> Result<PgPool> {
        if let Some(pool) = read(&self.pools).get(db_name) {
            return Ok(pool.clone());
        }

        debug!(database = %db_name, "Constructing pool");
        let pool = self.engine.open(&self.url_for(db_name)).await?;

        let raced = {
            let mut pools = write(&self.pools);
            match pools.entry(db_name.to_string()) {
                Entry::Occupied(existing) => Some(existing.get().clone()),
                Entry::Vacant(slot) => {
                    slot.insert(pool.clone());
                    None
                }
            }
        };

        match raced {
            Some(existing) => {
                self.engine.close(pool).await;
                Ok(existing)
            }
            None => Ok(pool),
        }
    }

    fn take_pool(&self, db_name: &str) -> Option<PgPool> {
        write(&self.pools).remove(db_name)
    }

    fn url_for(&self, db_name: &str) -> String {
        match db_name {
            DEFAULT => self.url.as_str().to_string(),
            other => self.url.with_database(other),
        }
    }
}

impl std::fmt::Debug for TemplateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateManager")
            .field("base", &self.url.database_name())
            .field("root_template_id", &self.root_template_id)
            .field("pools", &read(&self.pools).len())
            .field("registry", &self.registry.key())
            .field("active_templates", &self.registry.len())
            .finish()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
