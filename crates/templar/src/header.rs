//! Header protocol for carrying a test database across a process boundary.
//!
//! A test client sends the name of its per-test database in
//! [`TEST_DB_HEADER`]; the serving side wraps request handling in a
//! [`HeaderScope`] so every connection acquired for the request routes to
//! that database.

use tracing::debug;

use crate::context::TestContext;
use crate::state::DatabaseConfigurationState;

/// Request header naming the per-test database.
pub const TEST_DB_HEADER: &str = "XX-TestDB";

/// State a header value maps to. Missing or blank values route to the default
/// database.
pub fn state_from_header(value: Option<&str>) -> DatabaseConfigurationState {
    match value.map(str::trim) {
        Some(name) if !name.is_empty() => DatabaseConfigurationState::IsolatedTestTemplate(name.to_string()),
        _ => DatabaseConfigurationState::Uninitialized,
    }
}

/// Applies a header value to a context and restores the previous state on drop.
#[derive(Debug)]
pub struct HeaderScope {
    ctx: TestContext,
    previous: Option<DatabaseConfigurationState>,
}

impl HeaderScope {
    pub fn enter(ctx: &TestContext, header_value: Option<&str>) -> Self {
        let state = state_from_header(header_value);
        debug!(header = TEST_DB_HEADER, state = %state, "Received test database header");
        let previous = ctx.replace(state);
        Self {
            ctx: ctx.clone(),
            previous: Some(previous),
        }
    }
}

impl Drop for HeaderScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.ctx.set(previous);
        }
    }
}
