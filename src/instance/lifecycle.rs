//! Instance lifecycle management (start/stop).
//!
//! Starting or stopping only changes reachability: the proxy config is
//! regenerated for every instance with the target's new state, and the
//! registry records the change once the config is on disk.

use super::{routes_with, Context};
use crate::error::{AppError, Result};
use crate::proxy;

/// Route traffic to a built instance again.
pub async fn start_instance(ctx: &Context<'_>, name: &str) -> Result<Option<String>> {
    set_running(ctx, name, true).await
}

/// Make a built instance unavailable. Its route stays and answers 503.
pub async fn stop_instance(ctx: &Context<'_>, name: &str) -> Result<Option<String>> {
    set_running(ctx, name, false).await
}

async fn set_running(ctx: &Context<'_>, name: &str, running: bool) -> Result<Option<String>> {
    let action = if running { "start" } else { "stop" };
    let instance = ctx.registry.get_instance(name)?;
    if !instance.built {
        return Err(AppError::not_built(name));
    }
    if instance.running == running {
        log::info!(
            "Instance {} already {}, regenerating proxy config anyway",
            name,
            if running { "running" } else { "stopped" }
        );
    }

    let mut candidate = instance;
    candidate.running = running;

    let result = proxy::regenerate(
        ctx.registry,
        &routes_with(ctx.registry, &candidate),
        ctx.settings,
        ctx.hooks.proxy_reloader.as_ref(),
    )
    .await;

    match result {
        Ok(warning) => {
            ctx.registry.modify_instance(name, |i| {
                i.running = running;
                i.run_error = None;
            })?;
            log::info!("Instance {} {} complete", name, action);
            Ok(warning)
        }
        Err(e) => {
            let message = format!("{} failed: {}", action, e.message());
            log::error!("Instance {}: {}", name, message);
            ctx.registry
                .modify_instance(name, |i| i.run_error = Some(message))?;
            Err(e)
        }
    }
}
