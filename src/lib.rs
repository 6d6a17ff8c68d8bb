//! Single-host control plane for provisioning tenant instances and serving
//! them behind a reverse proxy.

pub mod allocator;
pub mod api;
pub mod archive;
pub mod commands;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod host;
pub mod instance;
pub mod jobs;
pub mod paths;
pub mod platform;
pub mod proxy;
pub mod registry;
pub mod validation;

pub use commands::{ControlPlane, StatusReport};
pub use error::{AppError, ErrorKind, Result};
