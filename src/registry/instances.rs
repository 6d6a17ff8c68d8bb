//! Instance records.

use std::collections::BTreeSet;

use chrono::Utc;

use super::{Instance, Registry, State};
use crate::allocator::derive_namespace;
use crate::error::{AppError, Result};
use crate::validation::validate_instance_name;

/// Uniqueness and lifecycle checks shared by add and update.
fn check_record(state: &State, instance: &Instance, replacing: Option<&str>) -> Result<()> {
    if instance.running && !instance.built {
        return Err(AppError::not_built(&instance.name));
    }

    for other in state.instances.values() {
        if Some(other.name.as_str()) == replacing {
            continue;
        }
        if other.name == instance.name || other.namespace == instance.namespace {
            return Err(AppError::duplicate_name(&instance.name));
        }
        if other.port == instance.port {
            return Err(AppError::duplicate_port(instance.port));
        }
    }
    Ok(())
}

impl Registry {
    /// All instances ordered by name.
    pub fn list_instances(&self) -> Vec<Instance> {
        self.state().instances.values().cloned().collect()
    }

    pub fn get_instance(&self, name: &str) -> Result<Instance> {
        self.state()
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::instance_not_found(name))
    }

    /// Ports held by persisted instances.
    pub fn used_ports(&self) -> BTreeSet<u16> {
        self.state().instances.values().map(|i| i.port).collect()
    }

    /// Persist a new instance. Fails with `DuplicateName` if the name or
    /// namespace is taken and `DuplicatePort` if the port is.
    pub fn add_instance(&self, instance: Instance) -> Result<Instance> {
        validate_instance_name(&instance.name)?;
        if derive_namespace(&instance.name)? != instance.namespace {
            return Err(AppError::other(format!(
                "Namespace {} does not belong to instance {}",
                instance.namespace, instance.name
            )));
        }

        self.with_state_mut(|state| {
            check_record(state, &instance, None)?;
            state
                .instances
                .insert(instance.name.clone(), instance.clone());
            Ok(())
        })?;

        log::info!(
            "Registered instance {} (namespace {}, port {})",
            instance.name,
            instance.namespace,
            instance.port
        );
        Ok(instance)
    }

    /// Replace an existing instance record. Name, namespace and port are
    /// fixed for the instance lifetime.
    pub fn update_instance(&self, instance: Instance) -> Result<Instance> {
        self.with_state_mut(|state| replace_record(state, instance))
    }

    /// Apply `f` to the stored record and persist it, bumping `updated_at`.
    /// Read and write happen under one registry lock.
    pub fn modify_instance<F>(&self, name: &str, f: F) -> Result<Instance>
    where
        F: FnOnce(&mut Instance),
    {
        self.with_state_mut(|state| {
            let mut instance = state
                .instances
                .get(name)
                .cloned()
                .ok_or_else(|| AppError::instance_not_found(name))?;
            f(&mut instance);
            instance.updated_at = Utc::now();
            replace_record(state, instance)
        })
    }
}

fn replace_record(state: &mut State, instance: Instance) -> Result<Instance> {
    let current = state
        .instances
        .get(&instance.name)
        .ok_or_else(|| AppError::instance_not_found(&instance.name))?;
    if current.namespace != instance.namespace || current.port != instance.port {
        return Err(AppError::other(format!(
            "Namespace and port of instance {} cannot change",
            instance.name
        )));
    }
    check_record(state, &instance, Some(&instance.name))?;
    state
        .instances
        .insert(instance.name.clone(), instance.clone());
    Ok(instance)
}
