//! Persisted registry records.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::platform::HostInfo;

/// One probed host dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub installed: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// Class of mutating operation protected by its own guard flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardClass {
    /// Dependency installation.
    Installation,
    /// Instance create/start/stop.
    InstanceChange,
}

impl GuardClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installation => "installation",
            Self::InstanceChange => "instance_change",
        }
    }
}

impl fmt::Display for GuardClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuardClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.replace('-', "_").as_str() {
            "installation" => Ok(Self::Installation),
            "instance_change" => Ok(Self::InstanceChange),
            other => Err(AppError::validation(HashMap::from([(
                "class".to_string(),
                format!("unknown guard class {:?}", other),
            )]))),
        }
    }
}

/// Immutable, versioned record of host-level state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub settings: Settings,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub host: Option<HostInfo>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub installation_in_progress: bool,
    #[serde(default)]
    pub instance_change_in_progress: bool,
    /// Failure message of the last dependency installation.
    #[serde(default)]
    pub install_error: Option<String>,
    /// Standing warning: config on disk differs from what the live proxy serves.
    #[serde(default)]
    pub proxy_warning: Option<String>,
}

impl Snapshot {
    /// Unpersisted snapshot standing in for an empty chain.
    pub fn initial(settings: Settings) -> Self {
        Self {
            version: 0,
            created_at: Utc::now(),
            settings,
            dependencies: Vec::new(),
            host: None,
            last_checked: None,
            installation_in_progress: false,
            instance_change_in_progress: false,
            install_error: None,
            proxy_warning: None,
        }
    }

    /// Copy carrying every field forward under the next version.
    pub(crate) fn successor(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.created_at = Utc::now();
        next
    }

    pub fn guard(&self, class: GuardClass) -> bool {
        match class {
            GuardClass::Installation => self.installation_in_progress,
            GuardClass::InstanceChange => self.instance_change_in_progress,
        }
    }

    pub(crate) fn set_guard(&mut self, class: GuardClass, held: bool) {
        match class {
            GuardClass::Installation => self.installation_in_progress = held,
            GuardClass::InstanceChange => self.instance_change_in_progress = held,
        }
    }

    /// Whether cached probe data is older than `max_age` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Some(checked) = self.last_checked else {
            return true;
        };
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(checked) > max_age,
            Err(_) => false,
        }
    }
}

/// One hosted tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    #[serde(default)]
    pub human_name: Option<String>,
    #[serde(default)]
    pub built: bool,
    #[serde(default)]
    pub build_error: Option<String>,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub run_error: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    /// A freshly registered, unbuilt instance.
    pub fn new(name: &str, namespace: &str, port: u16, human_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            port,
            human_name,
            built: false,
            build_error: None,
            running: false,
            run_error: None,
            url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Everything the registry persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default)]
    pub instances: BTreeMap<String, Instance>,
}
