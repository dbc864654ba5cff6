//! At most one open remediation cycle per (repository, workflow).

use std::collections::HashSet;
use std::sync::Mutex;

use crate::validation::RepoName;

type Key = (String, u64);

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    keys: Mutex<HashSet<Key>>,
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    key: Key,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when a cycle for the same pair is already running.
    pub fn try_acquire(&self, repo: &RepoName, workflow_id: u64) -> Option<InFlightGuard<'_>> {
        let key = (repo.full_name(), workflow_id);
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            registry: self,
            key,
        })
    }

    pub fn is_busy(&self, repo: &RepoName, workflow_id: u64) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(repo.full_name(), workflow_id))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
