//! Build pipeline.
//!
//! 1. validate the request against the registry
//! 2. allocate namespace and port, register the unbuilt instance
//! 3. provision storage and credentials
//! 4. scaffold instance code
//! 5. regenerate and install the proxy config including the instance
//! 6. reload the process supervisor
//!
//! The instance is persisted as built and running only after step 6. A
//! failing step records `build_error` on the instance and stops the
//! pipeline. Resources created by earlier steps stay in place for the
//! operator (see `cleanup_instance`).

use super::types::BuildStep;
use super::{routes_with, Context};
use crate::allocator::{allocate_port_from, derive_namespace};
use crate::error::{AppError, Result};
use crate::paths::namespace_dir;
use crate::proxy;
use crate::registry::Instance;
use crate::validation::validate_create_fields;

/// Run the full pipeline for a new instance. Returns the standing proxy
/// warning if the proxy reload failed.
pub async fn build_instance(
    ctx: &Context<'_>,
    name: &str,
    human_name: Option<String>,
) -> Result<Option<String>> {
    // Step 1
    validate_create_fields(name, human_name.as_deref())?;
    if ctx.registry.get_instance(name).is_ok() {
        return Err(AppError::duplicate_name(name));
    }

    // Step 2
    let namespace = derive_namespace(name)?;
    let port = allocate_port_from(ctx.settings.port_base, &ctx.registry.used_ports())?;
    let instance = ctx
        .registry
        .add_instance(Instance::new(name, &namespace, port, human_name))?;

    run_build_steps(ctx, instance).await
}

/// Re-run steps 3-6 for an instance whose build failed, reusing its
/// namespace and port.
pub async fn rebuild_instance(ctx: &Context<'_>, name: &str) -> Result<Option<String>> {
    let instance = ctx.registry.get_instance(name)?;
    if instance.built {
        return Err(AppError::already_built(name));
    }
    log::info!("Rebuilding instance {}", name);
    run_build_steps(ctx, instance).await
}

async fn run_build_steps(ctx: &Context<'_>, instance: Instance) -> Result<Option<String>> {
    let name = instance.name.clone();
    match build_steps(ctx, instance).await {
        Ok(warning) => {
            log::info!("Instance {} built and running", name);
            Ok(warning)
        }
        Err((step, e)) => {
            let message = format!("{} step failed: {}", step.as_str(), e.message());
            log::error!("Build of instance {} failed: {}", name, message);
            ctx.registry.modify_instance(&name, |i| {
                i.built = false;
                i.running = false;
                i.url = None;
                i.build_error = Some(message);
            })?;
            Err(e)
        }
    }
}

async fn build_steps(
    ctx: &Context<'_>,
    instance: Instance,
) -> std::result::Result<Option<String>, (BuildStep, AppError)> {
    let dir = namespace_dir(&ctx.settings.storage_root, &instance.namespace);

    // Step 3
    log::info!("Provisioning namespace {} for {}", instance.namespace, instance.name);
    ctx.hooks
        .provisioner
        .provision(&instance.namespace, &dir, &ctx.settings.credentials)
        .await
        .map_err(|e| (BuildStep::Provision, AppError::provision_failed(e)))?;

    // Step 4
    log::info!("Scaffolding {} on port {}", instance.namespace, instance.port);
    ctx.hooks
        .scaffolder
        .scaffold(&instance.namespace, &dir, instance.port)
        .await
        .map_err(|e| (BuildStep::Scaffold, AppError::scaffold_failed(e)))?;

    // Step 5
    let url = ctx.settings.public_url(&instance.namespace);
    let mut built = instance;
    built.built = true;
    built.running = true;
    built.url = Some(url.clone());
    let warning = proxy::regenerate(
        ctx.registry,
        &routes_with(ctx.registry, &built),
        ctx.settings,
        ctx.hooks.proxy_reloader.as_ref(),
    )
    .await
    .map_err(|e| (BuildStep::Proxy, e))?;

    // Step 6
    if let Err(e) = ctx.hooks.supervisor.reload().await {
        // The installed config already routes the instance; put back the
        // route set the registry describes.
        if let Err(regen) = proxy::regenerate(
            ctx.registry,
            &ctx.registry.list_instances(),
            ctx.settings,
            ctx.hooks.proxy_reloader.as_ref(),
        )
        .await
        {
            log::error!(
                "Failed to restore proxy config after supervisor failure: {}",
                regen
            );
        }
        return Err((BuildStep::Supervisor, AppError::supervisor_failed(e)));
    }

    // Only the build outcome is written; fields edited while the job ran
    // (human_name) are kept.
    ctx.registry
        .modify_instance(&built.name, |i| {
            i.built = true;
            i.running = true;
            i.build_error = None;
            i.run_error = None;
            i.url = Some(url);
        })
        .map_err(|e| (BuildStep::Register, e))?;
    Ok(warning)
}
