//! External collaborators.
//!
//! The control plane only sees success or failure plus a message from each
//! of these. The default implementations shell out to operator-configured
//! commands from `[hooks]` in `senex.toml`.

mod command;
mod probe;
mod provision;
mod reload;
mod scaffold;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Credentials, HookConfig, ReloadMethod, Settings};
use crate::registry::Dependency;

pub use command::{CommandInstaller, CommandSupervisor};
pub use probe::CommandProbe;
pub use provision::StorageProvisioner;
pub use reload::{CommandReloader, NoopReloader, SignalReloader};
pub use scaffold::{TemplateScaffolder, INSTANCE_MANIFEST};

/// Read-only inspection of host dependencies.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    async fn probe(&self) -> Vec<Dependency>;
}

/// Toolchain installation.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, settings: &Settings) -> Result<(), String>;
}

/// Backing storage and credentials for one namespace.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(
        &self,
        namespace: &str,
        dir: &Path,
        credentials: &Credentials,
    ) -> Result<(), String>;
}

/// Materializes instance code and assets.
#[async_trait]
pub trait Scaffolder: Send + Sync {
    async fn scaffold(&self, namespace: &str, dir: &Path, port: u16) -> Result<(), String>;
}

/// Process supervisor serving the instances.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn reload(&self) -> Result<(), String>;
}

/// Tells the live reverse proxy to pick up the installed config.
#[async_trait]
pub trait ProxyReloader: Send + Sync {
    async fn reload(&self) -> Result<(), String>;
}

/// The full set of collaborators handed to the worker.
#[derive(Clone)]
pub struct Hooks {
    pub probe: Arc<dyn DependencyProbe>,
    pub installer: Arc<dyn Installer>,
    pub provisioner: Arc<dyn Provisioner>,
    pub scaffolder: Arc<dyn Scaffolder>,
    pub supervisor: Arc<dyn Supervisor>,
    pub proxy_reloader: Arc<dyn ProxyReloader>,
}

impl Hooks {
    /// Command-backed collaborators described by `config`.
    pub fn from_config(config: &HookConfig) -> Self {
        let proxy_reloader: Arc<dyn ProxyReloader> = match &config.proxy_reload {
            ReloadMethod::None => Arc::new(NoopReloader),
            ReloadMethod::Signal(pid_file) => Arc::new(SignalReloader::new(pid_file.clone())),
            ReloadMethod::Command(argv) => Arc::new(CommandReloader::new(argv.clone())),
        };

        Self {
            probe: Arc::new(CommandProbe::new(config.probes.clone())),
            installer: Arc::new(CommandInstaller::new(config.install_command.clone())),
            provisioner: Arc::new(StorageProvisioner::new(config.provision_command.clone())),
            scaffolder: Arc::new(TemplateScaffolder::new(config.template_archive.clone())),
            supervisor: Arc::new(CommandSupervisor::new(config.supervisor_command.clone())),
            proxy_reloader,
        }
    }
}
