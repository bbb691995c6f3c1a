//! Unique suffixes for per-test database names.

use std::collections::HashSet;
use std::sync::{LazyLock, Mutex};

use rand::Rng;
use tracing::debug;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Length of every generated suffix.
pub const SUFFIX_LEN: usize = 8;

type Source = Box<dyn FnMut() -> String + Send>;

/// Every suffix handed out in this process, across all suppliers.
static ISSUED: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// Supplies suffixes that are unique within this process run.
///
/// Draws 8 lowercase hex characters and redraws whenever a value was already
/// handed out by any supplier. The set of issued values only grows.
pub struct SuffixSupplier {
    source: Mutex<Source>,
}

impl SuffixSupplier {
    /// Supplier backed by the thread-local RNG.
    pub fn new() -> Self {
        Self::with_source(random_hex)
    }

    /// Supplier backed by a custom source, e.g. a deterministic sequence in tests.
    pub fn with_source(source: impl FnMut() -> String + Send + 'static) -> Self {
        Self {
            source: Mutex::new(Box::new(source)),
        }
    }

    /// Next suffix not yet used anywhere in this process.
    pub fn next(&self) -> String {
        let mut source = self.source.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let candidate = (*source)();
            if ISSUED
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(candidate.clone())
            {
                return candidate;
            }
            debug!(suffix = %candidate, "Suffix collision, redrawing");
        }
    }
}

impl Default for SuffixSupplier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SuffixSupplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuffixSupplier").finish_non_exhaustive()
    }
}

fn random_hex() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}
