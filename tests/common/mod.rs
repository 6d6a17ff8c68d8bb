//! Fake collaborators and a control plane rooted in a temp directory.
#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use senex::config::{Credentials, Settings};
use senex::host::{
    DependencyProbe, Hooks, Installer, Provisioner, ProxyReloader, Scaffolder, Supervisor,
};
use senex::jobs::{JobRecord, JobStatus};
use senex::paths::state_path;
use senex::registry::{Dependency, Registry, State};
use senex::ControlPlane;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Switchable failure shared by the fakes.
#[derive(Default)]
pub struct Failure(Mutex<Option<String>>);

impl Failure {
    pub fn set(&self, message: &str) {
        *lock(&self.0) = Some(message.to_string());
    }

    pub fn clear(&self) {
        *lock(&self.0) = None;
    }

    fn check(&self) -> Result<(), String> {
        match lock(&self.0).clone() {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeProvisioner {
    pub calls: Mutex<Vec<String>>,
    pub failure: Failure,
    /// When set, provisioning blocks until the gate is notified.
    pub gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeProvisioner {
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(
        &self,
        namespace: &str,
        dir: &Path,
        _credentials: &Credentials,
    ) -> Result<(), String> {
        lock(&self.calls).push(namespace.to_string());
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.failure.check()?;
        fs::create_dir_all(dir).map_err(|e| e.to_string())
    }
}

#[derive(Default)]
pub struct FakeScaffolder {
    pub calls: Mutex<Vec<(String, u16)>>,
    pub failure: Failure,
}

#[async_trait]
impl Scaffolder for FakeScaffolder {
    async fn scaffold(&self, namespace: &str, dir: &Path, port: u16) -> Result<(), String> {
        lock(&self.calls).push((namespace.to_string(), port));
        self.failure.check()?;
        fs::write(dir.join("instance.toml"), format!("port = {}\n", port))
            .map_err(|e| e.to_string())
    }
}

#[derive(Default)]
pub struct FakeSupervisor {
    pub reloads: AtomicUsize,
    pub failure: Failure,
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn reload(&self) -> Result<(), String> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.failure.check()
    }
}

#[derive(Default)]
pub struct FakeReloader {
    pub reloads: AtomicUsize,
    pub failure: Failure,
}

#[async_trait]
impl ProxyReloader for FakeReloader {
    async fn reload(&self) -> Result<(), String> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.failure.check()
    }
}

#[derive(Default)]
pub struct FakeProbe {
    pub calls: AtomicUsize,
}

#[async_trait]
impl DependencyProbe for FakeProbe {
    async fn probe(&self) -> Vec<Dependency> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        vec![
            Dependency {
                name: "nginx".to_string(),
                installed: true,
                version: Some("1.24.0".to_string()),
            },
            Dependency {
                name: "supervisor".to_string(),
                installed: false,
                version: None,
            },
        ]
    }
}

#[derive(Default)]
pub struct FakeInstaller {
    pub runs: AtomicUsize,
    pub failure: Failure,
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self, _settings: &Settings) -> Result<(), String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.failure.check()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub registry: Arc<Registry>,
    pub plane: Arc<ControlPlane>,
    pub provisioner: Arc<FakeProvisioner>,
    pub scaffolder: Arc<FakeScaffolder>,
    pub supervisor: Arc<FakeSupervisor>,
    pub reloader: Arc<FakeReloader>,
    pub probe: Arc<FakeProbe>,
    pub installer: Arc<FakeInstaller>,
}

impl Harness {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut defaults = Settings::defaults_for(dir.path());
        defaults.host = "old.example.org".to_string();
        let registry = Arc::new(Registry::open(state_path(dir.path()), defaults).unwrap());

        let provisioner = Arc::new(FakeProvisioner::default());
        let scaffolder = Arc::new(FakeScaffolder::default());
        let supervisor = Arc::new(FakeSupervisor::default());
        let reloader = Arc::new(FakeReloader::default());
        let probe = Arc::new(FakeProbe::default());
        let installer = Arc::new(FakeInstaller::default());

        let hooks = Hooks {
            probe: Arc::clone(&probe) as Arc<dyn DependencyProbe>,
            installer: Arc::clone(&installer) as Arc<dyn Installer>,
            provisioner: Arc::clone(&provisioner) as Arc<dyn Provisioner>,
            scaffolder: Arc::clone(&scaffolder) as Arc<dyn Scaffolder>,
            supervisor: Arc::clone(&supervisor) as Arc<dyn Supervisor>,
            proxy_reloader: Arc::clone(&reloader) as Arc<dyn ProxyReloader>,
        };
        let plane = Arc::new(ControlPlane::new(Arc::clone(&registry), hooks));

        Self {
            dir,
            registry,
            plane,
            provisioner,
            scaffolder,
            supervisor,
            reloader,
            probe,
            installer,
        }
    }

    pub fn settings(&self) -> Settings {
        self.registry.get_current_settings().settings
    }

    /// Installed proxy config, `None` if nothing was ever written.
    pub fn proxy_config(&self) -> Option<String> {
        fs::read_to_string(self.settings().proxy_config_path).ok()
    }

    pub fn state(&self) -> State {
        (*self.registry.state()).clone()
    }

    pub async fn finish(&self, record: JobRecord) -> JobRecord {
        self.plane.wait_job(record.id).await.unwrap()
    }

    /// Build `name` and assert the job succeeded.
    pub async fn build(&self, name: &str) -> JobRecord {
        let record = self.plane.create_instance(name, None).unwrap();
        let record = self.finish(record).await;
        assert!(
            matches!(record.status, JobStatus::Succeeded { .. }),
            "build of {} did not succeed: {:?}",
            name,
            record.status
        );
        record
    }
}

pub fn failure_message(record: &JobRecord) -> Option<&str> {
    match &record.status {
        JobStatus::Failed { error } => Some(error.message.as_str()),
        _ => None,
    }
}
