//! Queued mutating operations.
//!
//! Every mutating operation runs as a job on one sequential worker. The
//! guard flags in the snapshot chain, not the queue length, say whether
//! something is in progress.

mod queue;
mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{AppError, ErrorKind};
use crate::registry::GuardClass;

pub use queue::JobQueue;
pub use worker::Worker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    InstallDependencies,
    BuildInstance {
        name: String,
        #[serde(default)]
        human_name: Option<String>,
    },
    RebuildInstance {
        name: String,
    },
    StartInstance {
        name: String,
    },
    StopInstance {
        name: String,
    },
    CleanupInstance {
        name: String,
    },
}

impl JobKind {
    /// Guard that must be held while the job runs.
    pub fn guard_class(&self) -> GuardClass {
        match self {
            Self::InstallDependencies => GuardClass::Installation,
            _ => GuardClass::InstanceChange,
        }
    }

    /// Instance the job targets, if any.
    pub fn instance(&self) -> Option<&str> {
        match self {
            Self::InstallDependencies => None,
            Self::BuildInstance { name, .. }
            | Self::RebuildInstance { name }
            | Self::StartInstance { name }
            | Self::StopInstance { name }
            | Self::CleanupInstance { name } => Some(name),
        }
    }
}

/// A unit of queued work with the settings captured at submission.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub settings: Settings,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: JobKind, settings: Settings) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            settings,
            submitted_at: Utc::now(),
        }
    }
}

/// Why a job failed, in a form that survives the trip through JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: u32,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AppError> for JobFailure {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.kind().code(),
            kind: err.kind(),
            message: err.message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded {
        #[serde(default)]
        warning: Option<String>,
    },
    Failed {
        error: JobFailure,
    },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// What status queries report about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: JobKind,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Broadcast on every job status change.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_class_by_kind() {
        assert_eq!(
            JobKind::InstallDependencies.guard_class(),
            GuardClass::Installation
        );
        assert_eq!(
            JobKind::StopInstance {
                name: "bla".to_string()
            }
            .guard_class(),
            GuardClass::InstanceChange
        );
    }

    #[test]
    fn record_serializes_flat() {
        let record = JobRecord {
            id: Uuid::nil(),
            kind: JobKind::StartInstance {
                name: "bla".to_string(),
            },
            status: JobStatus::Succeeded { warning: None },
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "start_instance");
        assert_eq!(json["name"], "bla");
        assert_eq!(json["status"]["state"], "succeeded");

        let back: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
