//! Process-lifetime record of fully built templates.
//!
//! Templates outlive any single [`TemplateManager`](crate::TemplateManager):
//! every manager in the process that points at the same server and root
//! template shares one registry, so a template is migrated and seeded once per
//! process no matter how many managers (or test runtimes) ask for it.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex as StdMutex, RwLock};

use templar_ids::TemplateId;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

static REGISTRIES: LazyLock<StdMutex<HashMap<String, Arc<TemplateRegistry>>>> =
    LazyLock::new(|| StdMutex::new(HashMap::new()));

/// Built templates plus the lock that serialises building them.
#[derive(Debug)]
pub struct TemplateRegistry {
    key: String,
    active: RwLock<HashMap<TemplateId, String>>,
    build_lock: Mutex<()>,
}

impl TemplateRegistry {
    /// A registry not shared with anything else.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            active: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
        }
    }

    /// The registry shared by every manager in this process for `key`.
    pub fn shared(key: &str) -> Arc<Self> {
        let mut registries = REGISTRIES.lock().unwrap_or_else(|e| e.into_inner());
        registries
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Creating process-wide template registry");
                Arc::new(Self::new(key))
            })
            .clone()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Database name of a built template.
    pub fn get(&self, id: &TemplateId) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn contains_name(&self, db_name: &str) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .any(|n| n == db_name)
    }

    pub fn len(&self) -> usize {
        self.active.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn record(&self, id: TemplateId, db_name: String) {
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, db_name);
    }

    /// Held while a template is checked again and built.
    pub(crate) async fn lock_builds(&self) -> MutexGuard<'_, ()> {
        self.build_lock.lock().await
    }
}
