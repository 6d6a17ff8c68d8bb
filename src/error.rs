//! Control plane error types.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Control plane error carrying a stable reason code and a key/value payload.
#[derive(Debug, Clone)]
pub struct AppError {
    payload: HashMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No instance with that name
    InstanceNotFound,
    /// No job with that id
    JobNotFound,
    /// Instance is already built
    AlreadyBuilt,
    /// Field-level input validation failed
    Validation,
    /// Instance name contains disallowed characters or is empty
    InvalidName,
    /// Name or namespace already taken
    DuplicateName,
    /// Port already assigned to another instance
    DuplicatePort,
    /// A mutating operation of the same class is in flight
    OperationInProgress,
    /// Start/stop on an instance that is not built
    NotBuilt,
    /// Storage/credential provisioning failed
    ProvisionFailed,
    /// Materializing instance code failed
    ScaffoldFailed,
    /// Process supervisor reload failed
    SupervisorFailed,
    /// Dependency installation failed
    InstallFailed,
    /// Proxy config could not be written
    ProxyWriteFailed,
    /// Proxy config written but the live proxy was not reloaded
    ProxyReloadFailed,
    /// No free port left above the base
    PortsExhausted,
    /// Configuration error
    Config,
    /// File system error
    Io,
    /// Network error
    Network,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::InstanceNotFound => 1001,
            Self::JobNotFound => 1002,
            Self::AlreadyBuilt => 1003,
            Self::Validation => 2001,
            Self::InvalidName => 2002,
            Self::DuplicateName => 2003,
            Self::DuplicatePort => 2004,
            Self::OperationInProgress => 3001,
            Self::NotBuilt => 3002,
            Self::ProvisionFailed => 4001,
            Self::ScaffoldFailed => 4002,
            Self::SupervisorFailed => 4003,
            Self::InstallFailed => 4004,
            Self::ProxyWriteFailed => 4005,
            Self::ProxyReloadFailed => 4006,
            Self::PortsExhausted => 5001,
            Self::Config => 9001,
            Self::Io => 9002,
            Self::Network => 9003,
            Self::Other => 9999,
        }
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, payload: HashMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            HashMap::new()
        } else {
            HashMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    pub fn instance_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::InstanceNotFound,
            HashMap::from([("name".to_string(), name.to_string())]),
        )
    }

    pub fn job_not_found(id: &str) -> Self {
        Self::new(
            ErrorKind::JobNotFound,
            HashMap::from([("id".to_string(), id.to_string())]),
        )
    }

    pub fn already_built(name: &str) -> Self {
        Self::new(
            ErrorKind::AlreadyBuilt,
            HashMap::from([("name".to_string(), name.to_string())]),
        )
    }

    /// Field-specific validation failure, one payload entry per field.
    pub fn validation(fields: HashMap<String, String>) -> Self {
        Self::new(ErrorKind::Validation, fields)
    }

    pub fn invalid_name(name: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::InvalidName,
            HashMap::from([
                ("name".to_string(), name.to_string()),
                ("reason".to_string(), reason.to_string()),
            ]),
        )
    }

    pub fn duplicate_name(name: &str) -> Self {
        Self::new(
            ErrorKind::DuplicateName,
            HashMap::from([("name".to_string(), name.to_string())]),
        )
    }

    pub fn duplicate_port(port: u16) -> Self {
        Self::new(
            ErrorKind::DuplicatePort,
            HashMap::from([("port".to_string(), port.to_string())]),
        )
    }

    pub fn operation_in_progress(guard: &str) -> Self {
        Self::new(
            ErrorKind::OperationInProgress,
            HashMap::from([("guard".to_string(), guard.to_string())]),
        )
    }

    pub fn not_built(name: &str) -> Self {
        Self::new(
            ErrorKind::NotBuilt,
            HashMap::from([("name".to_string(), name.to_string())]),
        )
    }

    pub fn provision_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::ProvisionFailed, message)
    }

    pub fn scaffold_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::ScaffoldFailed, message)
    }

    pub fn supervisor_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::SupervisorFailed, message)
    }

    pub fn install_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::InstallFailed, message)
    }

    pub fn proxy_write_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::ProxyWriteFailed, message)
    }

    pub fn proxy_reload_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::ProxyReloadFailed, message)
    }

    pub fn ports_exhausted(base: u16) -> Self {
        Self::new(
            ErrorKind::PortsExhausted,
            HashMap::from([("base".to_string(), base.to_string())]),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Network, message)
    }

    pub fn network_with_url(url: &str, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Network,
            HashMap::from([
                ("url".to_string(), url.to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn payload(&self) -> &HashMap<String, String> {
        &self.payload
    }

    /// The "detail" payload entry, falling back to the full display form.
    pub fn message(&self) -> String {
        self.payload
            .get("detail")
            .cloned()
            .unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let mut pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            pairs.sort();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for AppError {}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("AppError", 3)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("kind", &self.kind)?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

/// Wire form of [`AppError`], used to rebuild errors returned by the daemon.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: u32,
    pub kind: ErrorKind,
    #[serde(default)]
    pub payload: HashMap<String, String>,
}

impl From<ErrorBody> for AppError {
    fn from(body: ErrorBody) -> Self {
        Self::new(body.kind, body.payload)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
