use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use engine_logging::engine_warn;
use jobscout_core::is_available;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dedup store error: {0}")]
pub struct StoreError(pub String);

/// Persistent set of already-seen apply links, shared by every session.
pub trait DedupStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    fn insert(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    seen: RwLock<HashSet<String>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seen: RwLock::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.read().map(|seen| seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .seen
            .read()
            .map(|seen| seen.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl DedupStore for InMemoryDedupStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.seen
            .read()
            .map(|seen| seen.contains(key))
            .map_err(|err| StoreError(err.to_string()))
    }

    fn insert(&self, key: &str) -> Result<(), StoreError> {
        self.seen
            .write()
            .map(|mut seen| {
                seen.insert(key.to_string());
            })
            .map_err(|err| StoreError(err.to_string()))
    }
}

/// Gate in front of a [`DedupStore`]. Unknown links are never duplicates and
/// store failures fail open.
#[derive(Clone)]
pub struct DedupGate {
    store: Arc<dyn DedupStore>,
}

impl DedupGate {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self { store }
    }

    pub fn is_duplicate(&self, apply_link: &str) -> bool {
        if !is_available(apply_link) {
            return false;
        }
        match self.store.exists(apply_link) {
            Ok(found) => found,
            Err(err) => {
                engine_warn!("Dedup lookup failed for {}: {}; treating as new", apply_link, err);
                false
            }
        }
    }

    /// Marks an accepted link as seen so later cards and sessions skip it.
    pub fn remember(&self, apply_link: &str) {
        if !is_available(apply_link) {
            return;
        }
        if let Err(err) = self.store.insert(apply_link) {
            engine_warn!("Dedup insert failed for {}: {}", apply_link, err);
        }
    }
}
