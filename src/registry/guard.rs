//! Operation guards.
//!
//! A guard is a boolean in the snapshot chain. Acquiring and releasing are
//! both snapshot writes, so the check-and-set happens under the registry
//! write lock and every transition stays in the history. The instance-change
//! guard is the single coarse lock covering the port set and the proxy
//! config file.

use super::{GuardClass, Registry, Snapshot};
use crate::error::{AppError, Result};

impl Registry {
    /// Whether `class` is currently held.
    pub fn guard_held(&self, class: GuardClass) -> bool {
        self.get_current_settings().guard(class)
    }

    /// Set the guard flag, failing with `OperationInProgress` if it is
    /// already held. Nothing is written on failure.
    pub fn acquire_guard(&self, class: GuardClass) -> Result<Snapshot> {
        let snapshot = self.append_snapshot(|head, next| {
            if head.guard(class) {
                return Err(AppError::operation_in_progress(class.as_str()));
            }
            next.set_guard(class, true);
            Ok(true)
        })?;
        log::info!("Acquired {} guard (snapshot v{})", class, snapshot.version);
        Ok(snapshot)
    }

    /// Clear the guard flag with a new snapshot write.
    pub fn release_guard(&self, class: GuardClass) -> Result<Snapshot> {
        let snapshot = self.append_snapshot(|head, next| {
            if !head.guard(class) {
                log::warn!("Release of {} guard requested but it is not held", class);
                return Ok(false);
            }
            next.set_guard(class, false);
            Ok(true)
        })?;
        log::info!("Released {} guard (snapshot v{})", class, snapshot.version);
        Ok(snapshot)
    }

    /// Classes whose guard flag is currently set.
    pub fn held_guards(&self) -> Vec<GuardClass> {
        let current = self.get_current_settings();
        [GuardClass::Installation, GuardClass::InstanceChange]
            .into_iter()
            .filter(|class| current.guard(*class))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::ErrorKind;

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
    fn second_acquire_fails_without_writing() {
        let (_dir, registry) = open_temp();
        registry.acquire_guard(GuardClass::InstanceChange).unwrap();
        let before = registry.snapshots().len();

        let err = registry
            .acquire_guard(GuardClass::InstanceChange)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::OperationInProgress);
        assert_eq!(registry.snapshots().len(), before);
    }

    #[test]
    fn guard_classes_are_independent() {
        let (_dir, registry) = open_temp();
        registry.acquire_guard(GuardClass::InstanceChange).unwrap();
        registry.acquire_guard(GuardClass::Installation).unwrap();
        assert_eq!(
            registry.held_guards(),
            vec![GuardClass::Installation, GuardClass::InstanceChange]
        );
    }

    #[test]
    fn acquire_and_release_are_recorded_in_history() {
        let (_dir, registry) = open_temp();
        registry.acquire_guard(GuardClass::Installation).unwrap();
        registry.release_guard(GuardClass::Installation).unwrap();

        let history = registry.snapshots();
        assert_eq!(history.len(), 2);
        assert!(history[0].installation_in_progress);
        assert!(!history[1].installation_in_progress);
        assert!(!registry.guard_held(GuardClass::Installation));
    }

    #[test]
    fn releasing_a_free_guard_is_a_no_op() {
        let (_dir, registry) = open_temp();
        registry.release_guard(GuardClass::InstanceChange).unwrap();
        assert!(registry.snapshots().is_empty());
    }
}
