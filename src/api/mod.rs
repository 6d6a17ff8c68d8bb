//! HTTP API between the daemon and the CLI.

mod client;
mod server;
mod types;

pub use client::ApiClient;
pub use server::{router, serve, status_code};
pub use types::{
    CommitSettingsRequest, CreateInstanceRequest, DependenciesQuery, UpdateInstanceRequest,
};
