//! Removal of resources left behind by a failed build.

use super::Context;
use crate::error::{AppError, Result};
use crate::paths::namespace_dir;

/// Delete the namespace directory of an unbuilt instance. Returns whether
/// anything was removed. The registry record, namespace and port are kept
/// so a later rebuild reuses them.
pub fn cleanup_instance(ctx: &Context<'_>, name: &str) -> Result<bool> {
    let instance = ctx.registry.get_instance(name)?;
    if instance.built {
        return Err(AppError::already_built(name));
    }

    let dir = namespace_dir(&ctx.settings.storage_root, &instance.namespace);
    if !dir.exists() {
        log::info!("Nothing to clean up for instance {}", name);
        return Ok(false);
    }

    std::fs::remove_dir_all(&dir)
        .map_err(|e| AppError::io(format!("Failed to remove {:?}: {}", dir, e)))?;
    log::info!("Removed leftover storage {:?} of instance {}", dir, name);
    Ok(true)
}
