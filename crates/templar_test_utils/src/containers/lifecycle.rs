//! docker-compose control for the PostgreSQL test servers.

use crate::config::{DbVersion, TestDbConfig};
use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Set to use an already running server (e.g. a CI service container).
pub const ENV_EXTERNAL_SERVER: &str = "TEMPLAR_TEST_EXTERNAL_PG";

pub fn docker_compose_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("docker")
        .join("docker-compose.yml")
}

fn succeeds(cmd: &mut Command) -> bool {
    cmd.output().map(|o| o.status.success()).unwrap_or(false)
}

pub fn is_docker_available() -> bool {
    succeeds(Command::new("docker").arg("info"))
}

/// Run a compose subcommand, preferring the `docker compose` plugin over the
/// standalone `docker-compose` binary.
fn compose(args: &[&str]) -> Result<Output> {
    let file = docker_compose_path();

    if succeeds(Command::new("docker").args(["compose", "version"])) {
        return Command::new("docker")
            .args(["compose", "-f"])
            .arg(&file)
            .args(args)
            .output()
            .context("Failed to run docker compose");
    }

    Command::new("docker-compose")
        .arg("-f")
        .arg(&file)
        .args(args)
        .output()
        .context("Failed to run docker-compose")
}

fn compose_checked(args: &[&str]) -> Result<()> {
    let output = compose(args)?;
    if !output.status.success() {
        bail!(
            "docker compose {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

pub fn is_server_running(version: DbVersion) -> bool {
    compose(&["ps", "-q", version.service_name()])
        .map(|out| !out.stdout.is_empty())
        .unwrap_or(false)
}

pub fn start_server(version: DbVersion) -> Result<()> {
    info!(service = version.service_name(), "Starting test server");
    compose_checked(&["up", "-d", version.service_name()])
}

/// Stop every test server and drop their volumes.
pub fn stop_all_servers() -> Result<()> {
    info!("Stopping all test servers");
    compose_checked(&["down", "-v"])
}

/// Poll until the server accepts a query or the startup timeout passes.
pub async fn wait_for_ready(config: &TestDbConfig) -> Result<()> {
    let port = config.version.port();
    let start = Instant::now();
    info!(version = %config.version, port, "Waiting for test server");

    loop {
        let port_open = TcpStream::connect((config.host.as_str(), port)).await.is_ok();
        if port_open && accepts_queries(config).await {
            debug!(version = %config.version, elapsed = ?start.elapsed(), "Test server ready");
            return Ok(());
        }

        if start.elapsed() > STARTUP_TIMEOUT {
            bail!(
                "Timeout waiting for {} on port {} after {:?}",
                config.version,
                port,
                STARTUP_TIMEOUT
            );
        }
        sleep(POLL_INTERVAL).await;
    }
}

async fn accepts_queries(config: &TestDbConfig) -> bool {
    let url = config.database_url();
    let connect = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(1))
        .connect(&url);

    match timeout(Duration::from_secs(2), connect).await {
        Ok(Ok(pool)) => {
            let ok = sqlx::query("SELECT 1").execute(&pool).await.is_ok();
            pool.close().await;
            ok
        }
        _ => false,
    }
}

/// Make sure the server for `config` is up, starting it through compose
/// unless [`ENV_EXTERNAL_SERVER`] is set.
pub async fn ensure_server_running(config: &TestDbConfig) -> Result<()> {
    if std::env::var_os(ENV_EXTERNAL_SERVER).is_none() {
        if !is_docker_available() {
            bail!("Docker is not available. Install Docker or set {} to use an existing server.", ENV_EXTERNAL_SERVER);
        }
        if !is_server_running(config.version) {
            start_server(config.version)?;
        }
    }

    wait_for_ready(config).await
}
