//! Proxy config generation.
//!
//! The config file is one shared artifact: every change regenerates the
//! full route set rather than patching it.

mod install;
mod render;

pub use install::install;
pub use render::{render, HEADER};

use crate::config::Settings;
use crate::error::{ErrorKind, Result};
use crate::host::ProxyReloader;
use crate::registry::{Instance, Registry};

/// Render routes for `instances`, install them and keep the standing proxy
/// warning in sync.
///
/// `instances` is the complete set the config should describe, normally the
/// registry contents with the instance being changed substituted in.
/// Returns `Ok(Some(warning))` when the file was written but the reload
/// failed. A successful install clears any earlier warning.
pub async fn regenerate(
    registry: &Registry,
    instances: &[Instance],
    settings: &Settings,
    reloader: &dyn ProxyReloader,
) -> Result<Option<String>> {
    let text = render(instances, settings);

    match install(&text, &settings.proxy_config_path, reloader).await {
        Ok(()) => {
            registry.set_proxy_warning(None)?;
            Ok(None)
        }
        Err(e) if e.kind() == ErrorKind::ProxyReloadFailed => {
            let warning = format!("Proxy config written but not reloaded: {}", e.message());
            registry.set_proxy_warning(Some(warning.clone()))?;
            Ok(Some(warning))
        }
        Err(e) => Err(e),
    }
}

/// Config text the current registry contents would produce.
pub fn preview(registry: &Registry, settings: &Settings) -> String {
    render(&registry.list_instances(), settings)
}
