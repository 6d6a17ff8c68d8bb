use std::sync::Arc;

use super::{Job, JobFailure, JobKind, JobStatus};
use crate::dependencies::install_dependencies;
use crate::error::{AppError, Result};
use crate::host::Hooks;
use crate::instance::{self, Context};
use crate::registry::Registry;

/// Executes dequeued jobs against the registry and host collaborators.
#[derive(Clone)]
pub struct Worker {
    registry: Arc<Registry>,
    hooks: Hooks,
}

impl Worker {
    pub fn new(registry: Arc<Registry>, hooks: Hooks) -> Self {
        Self { registry, hooks }
    }

    /// Run `job` to completion, then release its guard whatever the
    /// outcome, including a panic inside the job.
    pub async fn run(&self, job: Job) -> JobStatus {
        let class = job.kind.guard_class();
        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.execute(&job).await });

        let status = match handle.await {
            Ok(Ok(warning)) => JobStatus::Succeeded { warning },
            Ok(Err(e)) => JobStatus::Failed {
                error: JobFailure::from(&e),
            },
            Err(e) => JobStatus::Failed {
                error: JobFailure::from(&AppError::other(format!("Job aborted: {}", e))),
            },
        };

        if let Err(e) = self.registry.release_guard(class) {
            log::error!("Failed to release {} guard: {}", class, e);
        }
        status
    }

    async fn execute(&self, job: &Job) -> Result<Option<String>> {
        let ctx = Context {
            registry: &self.registry,
            hooks: &self.hooks,
            settings: &job.settings,
        };

        match &job.kind {
            JobKind::InstallDependencies => {
                install_dependencies(&self.registry, &self.hooks, &job.settings).await
            }
            JobKind::BuildInstance { name, human_name } => {
                instance::build_instance(&ctx, name, human_name.clone()).await
            }
            JobKind::RebuildInstance { name } => instance::rebuild_instance(&ctx, name).await,
            JobKind::StartInstance { name } => instance::start_instance(&ctx, name).await,
            JobKind::StopInstance { name } => instance::stop_instance(&ctx, name).await,
            JobKind::CleanupInstance { name } => {
                instance::cleanup_instance(&ctx, name).map(|_| None)
            }
        }
    }
}
