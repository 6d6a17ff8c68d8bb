use std::path::Path;

use crate::error::{AppError, Result};
use crate::host::ProxyReloader;
use crate::paths::write_atomic;

/// Atomically replace `target` with `config_text`, then ask the live proxy
/// to reload.
///
/// A `ProxyReloadFailed` error means the file on disk is already the new
/// config while the proxy still serves the old one.
pub async fn install(config_text: &str, target: &Path, reloader: &dyn ProxyReloader) -> Result<()> {
    write_atomic(target, config_text.as_bytes())
        .map_err(|e| AppError::proxy_write_failed(e.message()))?;
    log::info!("Installed proxy config {:?}", target);

    reloader.reload().await.map_err(|e| {
        log::warn!("Proxy config {:?} written but reload failed: {}", target, e);
        AppError::proxy_reload_failed(e)
    })
}
