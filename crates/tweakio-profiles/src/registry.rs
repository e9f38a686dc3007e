//! In-process set of active profiles.
//!
//! Independent of the on-disk `is_active` flag: it only knows about profiles
//! this process registered, and it starts empty on every launch.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ActiveProfileRegistry {
    active: Mutex<HashSet<String>>,
}

impl ActiveProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `id` was not already registered.
    pub fn register(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        let mut active = self.active.lock();
        let added = active.insert(id.clone());
        debug!(profile = %id, added, active = active.len(), "profile registered");
        added
    }

    /// Returns `true` if `id` was registered.
    pub fn unregister(&self, id: &str) -> bool {
        let mut active = self.active.lock();
        let removed = active.remove(id);
        debug!(profile = %id, removed, active = active.len(), "profile unregistered");
        removed
    }

    pub fn count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active.lock().contains(id)
    }

    /// Sorted copy of the registered ids.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.active.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Launch policy: once any profile is active in this process, further
    /// launches run headless regardless of what was requested.
    pub fn effective_headless(&self, requested: bool) -> bool {
        requested || self.count() > 0
    }

    /// Register `id` for as long as the returned guard lives.
    ///
    /// If `id` was already registered the guard leaves it registered on drop.
    pub fn guard(self: &Arc<Self>, id: impl Into<String>) -> ActiveProfileGuard {
        let id = id.into();
        let owned = self.register(id.clone());
        ActiveProfileGuard {
            registry: Arc::clone(self),
            id,
            owned,
        }
    }
}

#[must_use = "the profile is unregistered when the guard is dropped"]
#[derive(Debug)]
pub struct ActiveProfileGuard {
    registry: Arc<ActiveProfileRegistry>,
    id: String,
    owned: bool,
}

impl ActiveProfileGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ActiveProfileGuard {
    fn drop(&mut self) {
        if self.owned {
            self.registry.unregister(&self.id);
        }
    }
}
