//! Routes connection requests to the database of the current test.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sqlx::PgPool;
use tracing::debug;

use crate::context::TestContext;
use crate::error::{IsolationError, Result};
use crate::manager::TemplateManager;
use crate::state::DatabaseConfigurationState;

/// Picks the physical database for a connection based on a [`TestContext`].
///
/// Keeps its own routing table, refreshed from the manager's pool registry on
/// every lookup. Resolving a context writes the concrete
/// `IsolatedTestTemplate` back into it, so later lookups in the same test
/// short-circuit to the same database.
#[derive(Debug)]
pub struct RoutingLookup {
    manager: Arc<TemplateManager>,
    targets: RwLock<HashMap<String, PgPool>>,
}

impl RoutingLookup {
    pub fn new(manager: Arc<TemplateManager>) -> Self {
        let targets = manager.target_data_source_map();
        Self {
            manager,
            targets: RwLock::new(targets),
        }
    }

    pub fn manager(&self) -> &Arc<TemplateManager> {
        &self.manager
    }

    /// Resolve the database name for `ctx` and normalize the context to it.
    pub async fn determine_current_lookup_key(&self, ctx: &TestContext) -> Result<String> {
        let state = ctx.get();
        debug!(state = %state, "Initial context received");

        let db_name = self.manager.ensure_datasource(&state).await?;

        *self.targets.write().unwrap_or_else(|e| e.into_inner()) =
            self.manager.target_data_source_map();

        ctx.set(DatabaseConfigurationState::IsolatedTestTemplate(db_name.clone()));
        debug!(database = %db_name, "Database determined");
        Ok(db_name)
    }

    /// Pool for the database the context currently routes to.
    pub async fn acquire(&self, ctx: &TestContext) -> Result<PgPool> {
        let db_name = self.determine_current_lookup_key(ctx).await?;
        self.targets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&db_name)
            .cloned()
            .ok_or_else(|| {
                IsolationError::invalid_state(format!(
                    "no routable pool for {} (cleaned up concurrently?)",
                    db_name
                ))
            })
    }

    /// Names currently present in the routing table.
    pub fn resolved_targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .targets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
