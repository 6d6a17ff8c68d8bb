use serde::{Deserialize, Serialize};

use crate::config::Settings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    #[serde(default)]
    pub human_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInstanceRequest {
    #[serde(default)]
    pub human_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSettingsRequest {
    pub settings: Settings,
    /// Re-probe dependencies after committing.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependenciesQuery {
    #[serde(default)]
    pub refresh: bool,
}
