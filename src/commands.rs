//! Operator-facing operations.
//!
//! Mutating requests are validated against the current state here, acquire
//! their guard and are handed to the job queue; a second request of the
//! same class fails fast with `OperationInProgress`. Queries read the
//! registry directly and never touch the queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::host::Hooks;
use crate::instance::{self, InstanceView};
use crate::jobs::{Job, JobKind, JobQueue, JobRecord, Worker};
use crate::platform::HostInfo;
use crate::proxy;
use crate::registry::{Dependency, GuardClass, Registry, Snapshot, DEPENDENCY_MAX_AGE};
use crate::validation::{validate_create_fields, validate_instance_name, validate_settings};

/// Everything an operator needs to decide whether to wait or to act.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub snapshot_version: u64,
    pub installation_in_progress: bool,
    pub instance_change_in_progress: bool,
    pub install_error: Option<String>,
    pub proxy_warning: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub host: Option<HostInfo>,
    pub last_checked: Option<DateTime<Utc>>,
    pub instances: Vec<InstanceView>,
}

pub struct ControlPlane {
    registry: Arc<Registry>,
    hooks: Hooks,
    queue: Arc<JobQueue>,
}

impl ControlPlane {
    /// Wire the registry and collaborators to a fresh job queue. Must be
    /// called inside a tokio runtime.
    pub fn new(registry: Arc<Registry>, hooks: Hooks) -> Self {
        let worker = Worker::new(Arc::clone(&registry), hooks.clone());
        let queue = JobQueue::start(worker);
        Self {
            registry,
            hooks,
            queue,
        }
    }

    fn settings(&self) -> Settings {
        self.registry.get_current_settings().settings
    }

    /// Acquire the job's guard, then enqueue it with the settings of the
    /// snapshot that recorded the acquisition.
    fn submit(&self, kind: JobKind) -> Result<JobRecord> {
        let class = kind.guard_class();
        let snapshot = self.registry.acquire_guard(class)?;
        let job = Job::new(kind, snapshot.settings);

        self.queue.submit(job).inspect_err(|_| {
            if let Err(e) = self.registry.release_guard(class) {
                log::error!("Failed to release {} guard after rejected submit: {}", class, e);
            }
        })
    }

    // === Instances ===

    pub fn create_instance(&self, name: &str, human_name: Option<String>) -> Result<JobRecord> {
        validate_create_fields(name, human_name.as_deref())?;
        if self.registry.get_instance(name).is_ok() {
            return Err(AppError::duplicate_name(name));
        }
        self.submit(JobKind::BuildInstance {
            name: name.to_string(),
            human_name,
        })
    }

    pub fn rebuild_instance(&self, name: &str) -> Result<JobRecord> {
        validate_instance_name(name)?;
        if self.registry.get_instance(name)?.built {
            return Err(AppError::already_built(name));
        }
        self.submit(JobKind::RebuildInstance {
            name: name.to_string(),
        })
    }

    pub fn start_instance(&self, name: &str) -> Result<JobRecord> {
        self.require_built(name)?;
        self.submit(JobKind::StartInstance {
            name: name.to_string(),
        })
    }

    pub fn stop_instance(&self, name: &str) -> Result<JobRecord> {
        self.require_built(name)?;
        self.submit(JobKind::StopInstance {
            name: name.to_string(),
        })
    }

    pub fn cleanup_instance(&self, name: &str) -> Result<JobRecord> {
        validate_instance_name(name)?;
        if self.registry.get_instance(name)?.built {
            return Err(AppError::already_built(name));
        }
        self.submit(JobKind::CleanupInstance {
            name: name.to_string(),
        })
    }

    pub fn update_instance(&self, name: &str, human_name: Option<String>) -> Result<InstanceView> {
        instance::update_human_name(&self.registry, &self.settings(), name, human_name)
    }

    pub fn list_instances(&self) -> Vec<InstanceView> {
        instance::list_instance_views(&self.registry, &self.settings())
    }

    pub fn get_instance(&self, name: &str) -> Result<InstanceView> {
        instance::get_instance_view(&self.registry, &self.settings(), name)
    }

    fn require_built(&self, name: &str) -> Result<()> {
        validate_instance_name(name)?;
        if self.registry.get_instance(name)?.built {
            Ok(())
        } else {
            Err(AppError::not_built(name))
        }
    }

    // === Jobs ===

    pub fn job(&self, id: Uuid) -> Result<JobRecord> {
        self.queue.get(id)
    }

    pub async fn wait_job(&self, id: Uuid) -> Result<JobRecord> {
        self.queue.wait(id).await
    }

    // === Settings & dependencies ===

    pub fn current_settings(&self) -> Snapshot {
        self.registry.get_current_settings()
    }

    pub fn settings_history(&self) -> Vec<Snapshot> {
        self.registry.snapshots()
    }

    /// Commit new settings; with `refresh` the dependency probe runs
    /// afterwards regardless of cache age.
    pub async fn commit_settings(&self, candidate: Settings, refresh: bool) -> Result<Snapshot> {
        validate_settings(&candidate)?;
        let snapshot = self.registry.commit_settings(candidate)?;
        if !refresh {
            return Ok(snapshot);
        }
        self.registry
            .refresh_if_stale(&snapshot, DEPENDENCY_MAX_AGE, true, self.hooks.probe.as_ref())
            .await
    }

    pub async fn refresh_dependencies(&self, force: bool) -> Result<Snapshot> {
        let current = self.registry.get_current_settings();
        self.registry
            .refresh_if_stale(&current, DEPENDENCY_MAX_AGE, force, self.hooks.probe.as_ref())
            .await
    }

    pub fn install_dependencies(&self) -> Result<JobRecord> {
        self.submit(JobKind::InstallDependencies)
    }

    // === Status & recovery ===

    pub async fn status(&self) -> Result<StatusReport> {
        let snapshot = self.refresh_dependencies(false).await?;
        let instances = instance::list_instance_views(&self.registry, &snapshot.settings);
        Ok(StatusReport {
            snapshot_version: snapshot.version,
            installation_in_progress: snapshot.installation_in_progress,
            instance_change_in_progress: snapshot.instance_change_in_progress,
            install_error: snapshot.install_error,
            proxy_warning: snapshot.proxy_warning,
            dependencies: snapshot.dependencies,
            host: snapshot.host,
            last_checked: snapshot.last_checked,
            instances,
        })
    }

    /// Operator reset of a guard left held by a stuck or crashed job.
    pub fn clear_guard(&self, class: GuardClass) -> Result<Snapshot> {
        if !self.registry.guard_held(class) {
            return Ok(self.registry.get_current_settings());
        }
        log::warn!("Operator cleared the {} guard", class);
        self.registry.release_guard(class)
    }

    /// Config the current registry would produce.
    pub fn render_proxy_config(&self) -> String {
        proxy::preview(&self.registry, &self.settings())
    }
}
