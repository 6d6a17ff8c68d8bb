//! Instance management.
//!
//! Layout per instance under the storage root:
//! - `<namespace>/` - provisioned storage
//! - `<namespace>/app/` - extracted template code
//! - `<namespace>/instance.toml` - manifest read by the serving process

mod cleanup;
mod crud;
mod deploy;
mod lifecycle;
mod types;

pub use types::InstanceView;

pub use crud::{get_instance_view, list_instance_views, update_human_name};

pub use deploy::{build_instance, rebuild_instance};

pub use lifecycle::{start_instance, stop_instance};

pub use cleanup::cleanup_instance;

use crate::config::Settings;
use crate::host::Hooks;
use crate::registry::{Instance, Registry};

/// Everything a pipeline or lifecycle step touches.
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub hooks: &'a Hooks,
    /// Settings captured when the job was submitted.
    pub settings: &'a Settings,
}

/// Registry contents with `candidate` substituted for its stored record.
fn routes_with(registry: &Registry, candidate: &Instance) -> Vec<Instance> {
    let mut instances = registry.list_instances();
    match instances.iter_mut().find(|i| i.name == candidate.name) {
        Some(slot) => *slot = candidate.clone(),
        None => instances.push(candidate.clone()),
    }
    instances
}
