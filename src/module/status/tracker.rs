//! Per-module status tracking
//!
//! Pure state holder: the scheduler and loader drive transitions, everything
//! else observes through [`StatusView`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::module::traits::{ModuleError, ModuleStatus};

/// Capacity of the change-notification channel
const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Notification emitted on every accepted transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub module: String,
    pub from: ModuleStatus,
    pub to: ModuleStatus,
}

#[derive(Debug, Clone)]
struct StatusEntry {
    status: ModuleStatus,
    last_error: Option<String>,
}

impl StatusEntry {
    fn pending() -> Self {
        Self {
            status: ModuleStatus::Pending,
            last_error: None,
        }
    }
}

/// Whether the state machine allows `from -> to`
pub fn is_valid_transition(from: ModuleStatus, to: ModuleStatus) -> bool {
    use ModuleStatus::*;
    matches!(
        (from, to),
        (Pending, Loading)
            | (Pending, Failed)
            | (Loading, Preloaded)
            | (Loading, Failed)
            | (Preloaded, Loaded)
            | (Preloaded, Failed)
            | (Failed, Loading)
            | (Loaded, Loading)
    )
}

struct TrackerInner {
    entries: RwLock<HashMap<String, StatusEntry>>,
    changes: broadcast::Sender<StatusChange>,
}

/// Status tracker handle; clones share state
#[derive(Clone)]
pub struct StatusTracker {
    inner: Arc<TrackerInner>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TrackerInner {
                entries: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    /// Create a `pending` entry for a module seen for the first time
    pub fn register(&self, module: &str) {
        let mut entries = self.write_entries();
        entries
            .entry(module.to_string())
            .or_insert_with(StatusEntry::pending);
    }

    /// Move a module to `to`, rejecting transitions the state machine forbids
    pub fn transition(&self, module: &str, to: ModuleStatus) -> Result<(), ModuleError> {
        self.apply(module, to, None)
    }

    /// Mark a module failed and remember why
    pub fn fail(&self, module: &str, reason: &ModuleError) -> Result<(), ModuleError> {
        self.apply(module, ModuleStatus::Failed, Some(reason.to_string()))
    }

    fn apply(
        &self,
        module: &str,
        to: ModuleStatus,
        error: Option<String>,
    ) -> Result<(), ModuleError> {
        let from = {
            let mut entries = self.write_entries();
            let entry = entries
                .get_mut(module)
                .ok_or_else(|| ModuleError::ModuleNotFound(module.to_string()))?;
            let from = entry.status;

            if !is_valid_transition(from, to) {
                warn!("Rejected status transition for {}: {} -> {}", module, from, to);
                return Err(ModuleError::InvalidTransition {
                    module: module.to_string(),
                    from,
                    to,
                });
            }

            entry.status = to;
            match to {
                ModuleStatus::Failed => entry.last_error = error,
                ModuleStatus::Loading => entry.last_error = None,
                _ => {}
            }
            from
        };

        debug!("Module {} status: {} -> {}", module, from, to);
        // No receivers is fine
        let _ = self.inner.changes.send(StatusChange {
            module: module.to_string(),
            from,
            to,
        });
        Ok(())
    }

    pub fn get(&self, module: &str) -> Option<ModuleStatus> {
        self.read_entries().get(module).map(|e| e.status)
    }

    /// Reason recorded with the most recent failure
    pub fn last_error(&self, module: &str) -> Option<String> {
        self.read_entries()
            .get(module)
            .and_then(|e| e.last_error.clone())
    }

    pub fn snapshot(&self) -> HashMap<String, ModuleStatus> {
        self.read_entries()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.changes.subscribe()
    }

    /// Read-only projection for the rest of the application
    pub fn view(&self) -> StatusView {
        StatusView {
            tracker: self.clone(),
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, StatusEntry>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, StatusEntry>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only projection of module statuses (name -> status)
#[derive(Clone)]
pub struct StatusView {
    tracker: StatusTracker,
}

impl StatusView {
    pub fn get(&self, module: &str) -> Option<ModuleStatus> {
        self.tracker.get(module)
    }

    pub fn last_error(&self, module: &str) -> Option<String> {
        self.tracker.last_error(module)
    }

    pub fn snapshot(&self) -> HashMap<String, ModuleStatus> {
        self.tracker.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.tracker.subscribe()
    }
}
