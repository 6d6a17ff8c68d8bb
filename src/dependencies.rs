//! Host toolchain installation.

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::host::Hooks;
use crate::registry::{Registry, DEPENDENCY_MAX_AGE};

/// Run the installer, record its outcome in the snapshot chain and re-probe
/// so the next status query shows what is now installed.
pub async fn install_dependencies(
    registry: &Registry,
    hooks: &Hooks,
    settings: &Settings,
) -> Result<Option<String>> {
    log::info!("Installing host dependencies ({} proxy)", settings.proxy_engine);

    if let Err(e) = hooks.installer.install(settings).await {
        log::error!("Dependency installation failed: {}", e);
        registry.set_install_error(Some(e.clone()))?;
        return Err(AppError::install_failed(e));
    }

    registry.set_install_error(None)?;
    let current = registry.get_current_settings();
    registry
        .refresh_if_stale(&current, DEPENDENCY_MAX_AGE, true, hooks.probe.as_ref())
        .await?;
    log::info!("Dependency installation finished");
    Ok(None)
}
