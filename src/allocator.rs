//! Port and namespace allocation.
//!
//! Both functions are pure. Nothing is reserved: a port counts as taken only
//! once the instance carrying it is persisted, which is safe because
//! allocation happens inside the build pipeline while the instance-change
//! guard is held.

use std::collections::BTreeSet;

use crate::config::DEFAULT_PORT_BASE;
use crate::error::{AppError, Result};
use crate::validation::validate_instance_name;

/// Fixed suffix appended to every instance name to form its namespace.
pub const NAMESPACE_SUFFIX: &str = "old";

/// Lowest port at or above [`DEFAULT_PORT_BASE`] not present in `used`.
pub fn allocate_port(used: &BTreeSet<u16>) -> Result<u16> {
    allocate_port_from(DEFAULT_PORT_BASE, used)
}

/// Lowest port at or above `base` not present in `used`.
pub fn allocate_port_from(base: u16, used: &BTreeSet<u16>) -> Result<u16> {
    (base..=u16::MAX)
        .find(|port| !used.contains(port))
        .ok_or_else(|| AppError::ports_exhausted(base))
}

/// Storage/database namespace for an instance name.
///
/// The name must already be in the namespace character class, so the
/// mapping is the identity plus a fixed suffix and therefore injective.
pub fn derive_namespace(name: &str) -> Result<String> {
    validate_instance_name(name)?;
    Ok(format!("{}{}", name, NAMESPACE_SUFFIX))
}
