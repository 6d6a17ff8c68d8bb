mod common;

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;

use common::Harness;
use senex::config::ProxyEngine;
use senex::error::ErrorKind;

#[tokio::test]
async fn commit_settings_is_idempotent() {
    let h = Harness::new();
    let mut settings = h.settings();
    settings.host = "old.example.net".to_string();

    let first = h.plane.commit_settings(settings.clone(), false).await.unwrap();
    let history_len = h.plane.settings_history().len();
    let second = h.plane.commit_settings(settings, false).await.unwrap();

    assert_eq!(second, first);
    assert_eq!(h.plane.settings_history().len(), history_len);
}

#[tokio::test]
async fn changed_settings_append_a_snapshot() {
    let h = Harness::new();
    let before = h.plane.current_settings();

    let mut settings = h.settings();
    settings.proxy_engine = ProxyEngine::Apache;
    let committed = h.plane.commit_settings(settings, false).await.unwrap();

    assert_eq!(committed.version, before.version + 1);
    assert_eq!(committed.settings.proxy_engine, ProxyEngine::Apache);
    assert_eq!(h.plane.current_settings(), committed);
}

#[tokio::test]
async fn invalid_settings_are_rejected_per_field() {
    let h = Harness::new();
    let mut settings = h.settings();
    settings.scheme = "gopher".to_string();
    settings.host = String::new();

    let err = h.plane.commit_settings(settings, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.payload().contains_key("scheme"));
    assert!(err.payload().contains_key("host"));
    assert!(h.plane.settings_history().is_empty());
}

#[tokio::test]
async fn commit_with_refresh_probes_dependencies() {
    let h = Harness::new();
    let mut settings = h.settings();
    settings.listen_port = 8080;

    let snapshot = h.plane.commit_settings(settings, true).await.unwrap();
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot.settings.listen_port, 8080);
    assert_eq!(snapshot.dependencies.len(), 2);
    assert!(snapshot.host.is_some());
    assert!(snapshot.last_checked.is_some());
}

#[tokio::test]
async fn status_probes_only_when_stale() {
    let h = Harness::new();

    let report = h.plane.status().await.unwrap();
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.dependencies.len(), 2);
    assert!(!report.installation_in_progress);
    assert!(!report.instance_change_in_progress);

    h.plane.status().await.unwrap();
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 1);

    h.plane.refresh_dependencies(true).await.unwrap();
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn status_lists_instances_with_public_urls() {
    let h = Harness::new();
    h.build("bla").await;

    let report = h.plane.status().await.unwrap();
    assert_eq!(report.instances.len(), 1);
    assert_eq!(report.instances[0].public_url, "http://old.example.org/blaold/");
    assert_eq!(report.proxy_warning, None);
}

#[tokio::test]
async fn jobs_use_settings_committed_before_submission() {
    let h = Harness::new();
    let mut settings = h.settings();
    settings.port_base = 9100;
    h.plane.commit_settings(settings, false).await.unwrap();

    h.build("bla").await;
    assert_eq!(h.registry.get_instance("bla").unwrap().port, 9100);
}

#[tokio::test]
async fn rendered_preview_matches_installed_config() {
    let h = Harness::new();
    h.build("bla").await;
    assert_eq!(Some(h.plane.render_proxy_config()), h.proxy_config());
}
