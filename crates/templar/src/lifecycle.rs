//! Per-test orchestration: request a database, run the test, clean up.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::context::TestContext;
use crate::error::IsolationError;
use crate::manager::TemplateManager;
use crate::routing::RoutingLookup;
use crate::state::{DatabaseConfigurationState, TemplateConfiguration};

/// Callbacks a test provides around its isolated database.
///
/// Only [`TestHooks::test_template`] is required.
#[async_trait]
pub trait TestHooks: Send {
    /// Fixture set the test starts from.
    fn test_template(&self) -> TemplateConfiguration;

    /// Label used in logs.
    ///
    /// Defaults to the current thread name, which the test harness sets to
    /// the test path. Runtime worker threads carry no test name, so there the
    /// hooks' type name is used instead.
    fn test_name(&self) -> String {
        match std::thread::current().name() {
            Some(name) if !is_runtime_thread(name) => name.to_string(),
            _ => std::any::type_name::<Self>().to_string(),
        }
    }

    /// Runs before any database work.
    async fn before_db_setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs once the per-test database exists, before the test body.
    async fn local_set_up(&mut self, _session: &TestSession) -> Result<()> {
        Ok(())
    }

    /// Runs after the test body, before the database is dropped.
    async fn local_tear_down(&mut self) -> Result<()> {
        Ok(())
    }
}

fn is_runtime_thread(name: &str) -> bool {
    name == "main" || name.starts_with("tokio-runtime-worker")
}

/// A bare template request needs no callbacks.
impl TestHooks for TemplateConfiguration {
    fn test_template(&self) -> TemplateConfiguration {
        self.clone()
    }
}

/// Handle a test uses to reach its own database.
#[derive(Debug, Clone)]
pub struct TestSession {
    ctx: TestContext,
    database: String,
    routing: Arc<RoutingLookup>,
}

impl TestSession {
    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Context to share with anything serving this test (see `HeaderScope`).
    pub fn context(&self) -> &TestContext {
        &self.ctx
    }

    /// Pool routed through the context.
    pub async fn pool(&self) -> crate::Result<PgPool> {
        self.routing.acquire(&self.ctx).await
    }

    /// Execute a statement that doesn't return rows.
    pub async fn execute(&self, sql: &str) -> crate::Result<()> {
        let pool = self.pool().await?;
        sqlx::query(sql).execute(&pool).await?;
        Ok(())
    }
}

/// Drives the setup → body → teardown sequence for one test.
#[derive(Debug, Clone)]
pub struct LifecycleDriver {
    manager: Arc<TemplateManager>,
    routing: Arc<RoutingLookup>,
}

impl LifecycleDriver {
    pub fn new(manager: Arc<TemplateManager>) -> Self {
        let routing = Arc::new(RoutingLookup::new(manager.clone()));
        Self { manager, routing }
    }

    pub fn manager(&self) -> &Arc<TemplateManager> {
        &self.manager
    }

    pub fn routing(&self) -> &Arc<RoutingLookup> {
        &self.routing
    }

    /// Materialize the test's database and run its local setup.
    ///
    /// Fails without running anything else if the database cannot be built.
    /// A failing or panicking `local_set_up` still has its database cleaned
    /// up; a panic is resumed afterwards.
    pub async fn setup<H: TestHooks + ?Sized>(&self, hooks: &mut H) -> Result<TestSession> {
        hooks.before_db_setup().await?;

        let ctx = TestContext::new();
        let state = self
            .manager
            .initialize_test_db(&ctx, hooks.test_template())
            .await?;

        let database = match state {
            DatabaseConfigurationState::IsolatedTestTemplate(name) => name,
            other => {
                return Err(IsolationError::invalid_state(format!(
                    "expected an isolated test database after setup, got {}",
                    other
                ))
                .into())
            }
        };

        info!(test = %hooks.test_name(), database = %database, "Test executing with isolated db");
        let session = TestSession {
            ctx,
            database,
            routing: self.routing.clone(),
        };

        let outcome = AssertUnwindSafe(hooks.local_set_up(&session))
            .catch_unwind()
            .await;
        if let Ok(Ok(())) = outcome {
            return Ok(session);
        }

        if let Err(cleanup) = self.release(&session).await {
            warn!(database = %session.database, error = %cleanup, "Cleanup after failed setup failed");
        }
        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(result) => result.map(|()| session),
        }
    }

    /// Run local teardown, drop the database and reset the context.
    ///
    /// Cleanup runs even if the local teardown fails or panics; the first
    /// error wins and a panic is resumed after cleanup.
    pub async fn teardown<H: TestHooks + ?Sized>(
        &self,
        hooks: &mut H,
        session: &TestSession,
    ) -> Result<()> {
        let local = AssertUnwindSafe(hooks.local_tear_down())
            .catch_unwind()
            .await;
        let cleaned = self.release(session).await;

        match local {
            Err(panic) => {
                if let Err(e) = cleaned {
                    warn!(database = %session.database, error = %e, "Cleanup after panicking teardown failed");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(local) => {
                local?;
                cleaned?;
                Ok(())
            }
        }
    }

    /// Full lifecycle around `body`. Cleanup happens on every exit path,
    /// including a panicking body (the panic is resumed afterwards).
    pub async fn run<H, F, Fut, T>(&self, mut hooks: H, body: F) -> Result<T>
    where
        H: TestHooks,
        F: FnOnce(TestSession) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.setup(&mut hooks).await?;
        let outcome = AssertUnwindSafe(body(session.clone())).catch_unwind().await;
        let teardown = self.teardown(&mut hooks, &session).await;

        match outcome {
            Err(panic) => {
                if let Err(e) = teardown {
                    warn!(database = %session.database, error = %e, "Teardown after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(e)) => {
                if let Err(td) = teardown {
                    warn!(database = %session.database, error = %td, "Teardown after test failure failed");
                }
                Err(e)
            }
            Ok(Ok(value)) => {
                teardown?;
                Ok(value)
            }
        }
    }

    async fn release(&self, session: &TestSession) -> crate::Result<()> {
        debug!(context = %session.ctx.get(), database = %session.database, "Shutting down context");
        let result = self
            .manager
            .clean_up(&DatabaseConfigurationState::isolated(&session.database))
            .await;
        session.ctx.reset();
        result
    }
}
