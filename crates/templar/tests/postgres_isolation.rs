//! Integration tests against a real PostgreSQL server.
//!
//! Run with:
//!   docker compose -f crates/templar_test_utils/docker/docker-compose.yml up -d postgres16
//!   cargo test -p templar --features docker-tests
//!
//! Every test builds its own manager against the same root template; the
//! process-wide registry makes them share the built templates.

#![cfg(feature = "docker-tests")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use templar::{
    DatabaseConfigurationState, FixtureGenerator, HeaderScope, IsolationConfig, LifecycleDriver,
    RoutingLookup, StatementMigrator, TemplateConfiguration, TemplateId, TemplateManager,
    TestContext,
};
use templar_logging::init_test_logging;
use templar_test_utils::{DbVersion, TestPgServer};

const SCHEMA: &str = "CREATE TABLE orders (id INT PRIMARY KEY, label TEXT NOT NULL)";
const ROOT: &str = "it_orders";

/// Fixture calls across every test in this binary.
static SEEDED_CALLS: AtomicUsize = AtomicUsize::new(0);

fn driver(config: IsolationConfig) -> LifecycleDriver {
    let config = config.with_template_db_name(ROOT);
    let manager = TemplateManager::connect(config, StatementMigrator::new([SCHEMA])).unwrap();
    LifecycleDriver::new(Arc::new(manager))
}

async fn setup() -> (TestPgServer, LifecycleDriver) {
    init_test_logging();
    let server = TestPgServer::start(DbVersion::from_env()).await.unwrap();
    let config = IsolationConfig::new(server.database_url());
    let driver = driver(config);
    (server, driver)
}

async fn labels(pool: &PgPool) -> Vec<String> {
    sqlx::query_scalar("SELECT label FROM orders ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap()
}

async fn current_database(pool: &PgPool) -> String {
    sqlx::query_scalar("SELECT current_database()")
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Inserts one order into the template.
struct SeededOrders;

#[async_trait]
impl FixtureGenerator for SeededOrders {
    fn template_id(&self) -> TemplateId {
        TemplateId::new("seeded").unwrap()
    }

    async fn initialize(&self, _template_name: &str, pool: &PgPool) -> anyhow::Result<()> {
        SEEDED_CALLS.fetch_add(1, Ordering::SeqCst);
        sqlx::query("INSERT INTO orders (id, label) VALUES (1, 'fixture')")
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_parallel_tests_see_only_their_own_rows() {
    let (server, driver) = setup().await;

    let mut hooks_a = TemplateConfiguration::NoAddedFixtures;
    let mut hooks_b = TemplateConfiguration::NoAddedFixtures;
    let (a, b) = tokio::join!(driver.setup(&mut hooks_a), driver.setup(&mut hooks_b));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.database_name(), b.database_name());

    a.execute("INSERT INTO orders (id, label) VALUES (1, 'a')").await.unwrap();
    b.execute("INSERT INTO orders (id, label) VALUES (1, 'b')").await.unwrap();

    let pool_a = a.pool().await.unwrap();
    let pool_b = b.pool().await.unwrap();
    assert_eq!(labels(&pool_a).await, vec!["a"]);
    assert_eq!(labels(&pool_b).await, vec!["b"]);
    assert_eq!(current_database(&pool_a).await, a.database_name());

    driver.teardown(&mut hooks_a, &a).await.unwrap();
    driver.teardown(&mut hooks_b, &b).await.unwrap();
    assert!(!server.database_exists(a.database_name()).await.unwrap());
    assert!(!server.database_exists(b.database_name()).await.unwrap());
    assert!(server.database_exists(ROOT).await.unwrap());

    driver.manager().close().await;
}

#[tokio::test]
async fn test_fixture_template_is_built_once() {
    let (server, driver) = setup().await;
    let config = TemplateConfiguration::fixtures(SeededOrders);

    let run = |config: TemplateConfiguration| {
        let driver = driver.clone();
        async move {
            driver
                .run(config, |session| async move {
                    let pool = session.pool().await?;
                    session
                        .execute("INSERT INTO orders (id, label) VALUES (2, 'test')")
                        .await?;
                    Ok(labels(&pool).await)
                })
                .await
                .unwrap()
        }
    };

    let (first, second, third) =
        tokio::join!(run(config.clone()), run(config.clone()), run(config.clone()));
    for seen in [first, second, third] {
        assert_eq!(seen, vec!["fixture", "test"]);
    }
    assert_eq!(SEEDED_CALLS.load(Ordering::SeqCst), 1);

    let template = driver
        .manager()
        .template_name(&TemplateId::new("seeded").unwrap())
        .unwrap();
    assert_eq!(template, "it_orders_seeded");
    assert!(server.database_exists(&template).await.unwrap());

    driver.manager().close().await;
}

#[tokio::test]
async fn test_retained_databases_survive_cleanup() {
    init_test_logging();
    let server = TestPgServer::start(DbVersion::from_env()).await.unwrap();
    let config = IsolationConfig::new(server.database_url()).retain_test_databases();
    let driver = driver(config);

    let name = driver
        .run(TemplateConfiguration::NoAddedFixtures, |session| async move {
            Ok(session.database_name().to_string())
        })
        .await
        .unwrap();

    assert!(server.database_exists(&name).await.unwrap());
    driver.manager().close().await;
    server
        .execute(&format!("DROP DATABASE \"{}\"", name))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_header_scope_routes_another_context_to_the_test_database() {
    let (_server, driver) = setup().await;
    let routing = RoutingLookup::new(driver.manager().clone());

    driver
        .run(TemplateConfiguration::NoAddedFixtures, |session| {
            let routing = &routing;
            async move {
                session
                    .execute("INSERT INTO orders (id, label) VALUES (7, 'from test')")
                    .await?;

                // Simulates the serving side of a request carrying the header
                let request_ctx = TestContext::new();
                {
                    let _scope = HeaderScope::enter(&request_ctx, Some(session.database_name()));
                    let pool = routing.acquire(&request_ctx).await?;
                    assert_eq!(current_database(&pool).await, session.database_name());
                    assert_eq!(labels(&pool).await, vec!["from test"]);
                }
                assert_eq!(request_ctx.get(), DatabaseConfigurationState::Uninitialized);
                Ok(())
            }
        })
        .await
        .unwrap();

    driver.manager().close().await;
}

#[tokio::test]
async fn test_separate_managers_reuse_the_seeded_template() {
    let (server, first) = setup().await;
    let second = driver(IsolationConfig::new(server.database_url()));
    assert!(Arc::ptr_eq(first.manager().registry(), second.manager().registry()));

    let body = |session: templar::TestSession| async move {
        let pool = session.pool().await?;
        Ok::<_, anyhow::Error>(labels(&pool).await)
    };
    let (a, b) = tokio::join!(
        first.run(TemplateConfiguration::fixtures(SeededOrders), body),
        second.run(TemplateConfiguration::fixtures(SeededOrders), body),
    );
    assert_eq!(a.unwrap(), vec!["fixture"]);
    assert_eq!(b.unwrap(), vec!["fixture"]);
    assert_eq!(SEEDED_CALLS.load(Ordering::SeqCst), 1);

    first.manager().close().await;
    second.manager().close().await;
}
