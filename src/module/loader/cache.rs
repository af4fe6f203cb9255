//! Load cache with join-on-promise semantics
//!
//! At most one load per key is in flight; later callers receive a clone of the
//! same shared future. Entries are inserted synchronously, before the load is
//! first polled.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;
use uuid::Uuid;

use crate::module::traits::{ModuleDefinition, ModuleError};

/// Outcome every caller of one load observes
pub type LoadResult = Result<Arc<dyn ModuleDefinition>, ModuleError>;

/// Shared handle to an in-flight or completed load
pub type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// Cache key: module name plus remote entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub module: String,
    pub remote_entry: String,
}

impl CacheKey {
    pub fn new(module: &str, remote_entry: &str) -> Self {
        Self {
            module: module.to_string(),
            remote_entry: remote_entry.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.remote_entry)
    }
}

struct CacheEntry {
    /// Distinguishes this load from a later one under the same key
    generation: Uuid,
    load: SharedLoad,
}

/// Mapping from key to in-flight-or-resolved load
#[derive(Default)]
pub struct LoadCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing load for `key`, or the load `start` builds for a new generation
    ///
    /// The returned flag is `true` when an existing entry was joined.
    pub fn get_or_start<F>(&self, key: &CacheKey, start: F) -> (SharedLoad, bool)
    where
        F: FnOnce(Uuid) -> BoxFuture<'static, LoadResult>,
    {
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get(key) {
            debug!("Joining cached load for {}", key);
            return (entry.load.clone(), true);
        }

        let generation = Uuid::new_v4();
        let load = start(generation).shared();
        entries.insert(
            key.clone(),
            CacheEntry {
                generation,
                load: load.clone(),
            },
        );
        debug!("Started load {} for {}", generation, key);
        (load, false)
    }

    /// Remove the entry for `key` only if it still belongs to `generation`
    pub fn remove_generation(&self, key: &CacheKey, generation: Uuid) -> bool {
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if entry.generation == generation => {
                entries.remove(key);
                debug!("Evicted failed load {} for {}", generation, key);
                true
            }
            _ => false,
        }
    }

    /// Drop whatever entry `key` holds
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lock_entries().remove(key).is_some()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock_entries().contains_key(key)
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.lock_entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
