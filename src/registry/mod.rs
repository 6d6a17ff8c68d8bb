//! Instance registry and configuration snapshot chain.
//!
//! The whole state is one JSON document. Reads go through an `Arc<State>`
//! cache; every mutation clones the cached state under a write lock, applies
//! the change, persists it atomically and only then swaps the cache, so a
//! failed write never leaves memory and disk disagreeing.

mod guard;
mod instances;
mod snapshot;
mod types;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::paths::write_atomic;

pub use snapshot::DEPENDENCY_MAX_AGE;
pub use types::{Dependency, GuardClass, Instance, Snapshot, State};

pub struct Registry {
    path: PathBuf,
    defaults: Settings,
    write_lock: Mutex<()>,
    cache: RwLock<Arc<State>>,
}

fn load_state_from_disk(path: &Path) -> Result<State> {
    if !path.exists() {
        return Ok(State::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read state {:?}: {}", path, e)))?;
    serde_json::from_str(&content).map_err(|e| AppError::config(e.to_string()))
}

fn save_state_to_disk(path: &Path, state: &State) -> Result<()> {
    let content = serde_json::to_vec_pretty(state)?;
    write_atomic(path, &content)
}

impl Registry {
    /// Open the registry stored at `path`. `defaults` stands in for the
    /// current settings until the first snapshot is written.
    pub fn open(path: impl Into<PathBuf>, defaults: Settings) -> Result<Self> {
        let path = path.into();
        let state = load_state_from_disk(&path)?;
        log::debug!(
            "Loaded registry {:?}: {} snapshots, {} instances",
            path,
            state.snapshots.len(),
            state.instances.len()
        );
        Ok(Self {
            path,
            defaults,
            write_lock: Mutex::new(()),
            cache: RwLock::new(Arc::new(state)),
        })
    }

    /// Current cached state.
    pub fn state(&self) -> Arc<State> {
        let state = self.cache.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&state)
    }

    /// Execute a read-modify-write operation on the state while holding the
    /// write lock. Nothing is written when `f` fails or leaves the state as it
    /// found it.
    pub(crate) fn with_state_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut State) -> Result<T>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.state();

        let mut updated = (*current).clone();
        let result = f(&mut updated)?;
        if updated == *current {
            return Ok(result);
        }
        save_state_to_disk(&self.path, &updated)?;

        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(updated);

        Ok(result)
    }

    /// Chain head of `state`, or the compiled-in defaults for an empty chain.
    fn head_of(&self, state: &State) -> Snapshot {
        state
            .snapshots
            .last()
            .cloned()
            .unwrap_or_else(|| Snapshot::initial(self.defaults.clone()))
    }

    /// Append a successor of the chain head. `f` edits the successor and
    /// returns `false` to skip the write, in which case the head is returned.
    pub(crate) fn append_snapshot<F>(&self, f: F) -> Result<Snapshot>
    where
        F: FnOnce(&Snapshot, &mut Snapshot) -> Result<bool>,
    {
        self.with_state_mut(|state| {
            let head = self.head_of(state);
            let mut next = head.successor();
            if !f(&head, &mut next)? {
                return Ok(head);
            }
            state.snapshots.push(next.clone());
            Ok(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(
            dir.path().join("state.json"),
            Settings::defaults_for(dir.path()),
        )
        .unwrap();
        (dir, registry)
    }

    #[test]
    fn unchanged_state_is_not_written() {
        let (_dir, registry) = open_temp();
        registry.with_state_mut(|_| Ok(())).unwrap();
        assert!(!registry.path.exists());
    }

    #[test]
    fn failed_mutation_leaves_cache_untouched() {
        let (_dir, registry) = open_temp();
        let result: Result<()> = registry.with_state_mut(|state| {
            state.snapshots.push(Snapshot::initial(Settings::default()));
            Err(AppError::other("abort"))
        });
        assert!(result.is_err());
        assert!(registry.state().snapshots.is_empty());
    }

    #[test]
    fn state_survives_reopen() {
        let (dir, registry) = open_temp();
        registry.append_snapshot(|_, _| Ok(true)).unwrap();
        drop(registry);

        let reopened = Registry::open(
            dir.path().join("state.json"),
            Settings::defaults_for(dir.path()),
        )
        .unwrap();
        assert_eq!(reopened.state().snapshots.len(), 1);
        assert_eq!(reopened.state().snapshots[0].version, 1);
    }
}
