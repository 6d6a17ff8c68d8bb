//! Settings snapshots and cached dependency probes.

use std::time::Duration;

use chrono::Utc;

use super::{Registry, Snapshot};
use crate::config::Settings;
use crate::error::Result;
use crate::host::DependencyProbe;
use crate::platform::host_info;

/// How long probed dependency data is served from the snapshot before a
/// request triggers a new probe.
pub const DEPENDENCY_MAX_AGE: Duration = Duration::from_secs(5 * 60);

impl Registry {
    /// The most recent snapshot, or compiled-in defaults if none was written.
    pub fn get_current_settings(&self) -> Snapshot {
        self.head_of(&self.state())
    }

    /// Full snapshot history, oldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.state().snapshots.clone()
    }

    /// Write a new snapshot if `candidate` differs from the current settings in
    /// any field; otherwise return the current snapshot untouched.
    ///
    /// Cached probe data is carried forward as-is. Callers wanting fresh
    /// dependency data follow up with [`Registry::refresh_if_stale`].
    pub fn commit_settings(&self, candidate: Settings) -> Result<Snapshot> {
        self.append_snapshot(|head, next| {
            let changed = head.settings.changed_fields(&candidate);
            if changed.is_empty() {
                log::debug!("Settings unchanged, keeping snapshot v{}", head.version);
                return Ok(false);
            }
            log::info!(
                "Committing settings snapshot v{} (changed: {})",
                next.version,
                changed.join(", ")
            );
            next.settings = candidate;
            Ok(true)
        })
    }

    /// Re-probe host dependencies when `snapshot` is older than `max_age` or
    /// `force` is set, recording the result in a new snapshot.
    pub async fn refresh_if_stale(
        &self,
        snapshot: &Snapshot,
        max_age: Duration,
        force: bool,
        probe: &dyn DependencyProbe,
    ) -> Result<Snapshot> {
        if !force && !snapshot.is_stale(Utc::now(), max_age) {
            return Ok(snapshot.clone());
        }

        log::info!(
            "Probing host dependencies (snapshot v{}, forced: {})",
            snapshot.version,
            force
        );
        let dependencies = probe.probe().await;
        let host = host_info();
        let checked_at = Utc::now();

        self.append_snapshot(move |_, next| {
            next.dependencies = dependencies;
            next.host = Some(host);
            next.last_checked = Some(checked_at);
            Ok(true)
        })
    }

    /// Record or clear the standing proxy warning.
    pub fn set_proxy_warning(&self, warning: Option<String>) -> Result<Snapshot> {
        self.append_snapshot(|head, next| {
            if head.proxy_warning == warning {
                return Ok(false);
            }
            next.proxy_warning = warning;
            Ok(true)
        })
    }

    /// Record or clear the last dependency installation failure.
    pub fn set_install_error(&self, error: Option<String>) -> Result<Snapshot> {
        self.append_snapshot(|head, next| {
            if head.install_error == error {
                return Ok(false);
            }
            next.install_error = error;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::ProxyEngine;
    use crate::registry::Dependency;

    struct CountingProbe(AtomicUsize);

    #[async_trait]
    impl DependencyProbe for CountingProbe {
        async fn probe(&self) -> Vec<Dependency> {
            self.0.fetch_add(1, Ordering::SeqCst);
            vec![Dependency {
                name: "nginx".to_string(),
                installed: true,
                version: Some("1.24.0".to_string()),
            }]
        }
    }

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
    fn empty_chain_returns_defaults() {
        let (dir, registry) = open_temp();
        let current = registry.get_current_settings();
        assert_eq!(current.version, 0);
        assert_eq!(current.settings, Settings::defaults_for(dir.path()));
        assert!(registry.snapshots().is_empty());
    }

    #[test]
    fn commit_settings_is_idempotent() {
        let (_dir, registry) = open_temp();
        let mut candidate = registry.get_current_settings().settings;
        candidate.host = "old.example.org".to_string();

        let first = registry.commit_settings(candidate.clone()).unwrap();
        let second = registry.commit_settings(candidate).unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second, first);
        assert_eq!(registry.snapshots().len(), 1);
    }

    #[test]
    fn commit_carries_guard_and_probe_fields_forward() {
        let (_dir, registry) = open_temp();
        registry
            .set_proxy_warning(Some("reload failed".to_string()))
            .unwrap();

        let mut candidate = registry.get_current_settings().settings;
        candidate.proxy_engine = ProxyEngine::Apache;
        let committed = registry.commit_settings(candidate).unwrap();

        assert_eq!(committed.proxy_warning.as_deref(), Some("reload failed"));
        assert_eq!(committed.settings.proxy_engine, ProxyEngine::Apache);
        assert_eq!(registry.snapshots().len(), 2);
    }

    #[tokio::test]
    async fn fresh_snapshot_is_served_from_cache() {
        let (_dir, registry) = open_temp();
        let probe = CountingProbe(AtomicUsize::new(0));

        let current = registry.get_current_settings();
        let refreshed = registry
            .refresh_if_stale(&current, DEPENDENCY_MAX_AGE, false, &probe)
            .await
            .unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);
        assert!(refreshed.last_checked.is_some());
        assert_eq!(refreshed.dependencies.len(), 1);
        assert!(refreshed.host.is_some());

        let cached = registry
            .refresh_if_stale(&refreshed, DEPENDENCY_MAX_AGE, false, &probe)
            .await
            .unwrap();
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);
        assert_eq!(cached, refreshed);
    }

    #[tokio::test]
    async fn force_flag_reprobes_fresh_snapshot() {
        let (_dir, registry) = open_temp();
        let probe = CountingProbe(AtomicUsize::new(0));

        let current = registry.get_current_settings();
        let refreshed = registry
            .refresh_if_stale(&current, DEPENDENCY_MAX_AGE, false, &probe)
            .await
            .unwrap();
        let forced = registry
            .refresh_if_stale(&refreshed, DEPENDENCY_MAX_AGE, true, &probe)
            .await
            .unwrap();

        assert_eq!(probe.0.load(Ordering::SeqCst), 2);
        assert_eq!(forced.version, refreshed.version + 1);
    }

    #[test]
    fn clearing_an_absent_warning_writes_nothing() {
        let (_dir, registry) = open_temp();
        registry.set_proxy_warning(None).unwrap();
        registry.set_install_error(None).unwrap();
        assert!(registry.snapshots().is_empty());
    }
}
