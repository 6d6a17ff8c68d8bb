//! Host-level settings and daemon configuration.
//!
//! [`Settings`] is the payload of every registry snapshot. [`DaemonConfig`] is
//! the operator-owned `senex.toml` describing how the daemon reaches its
//! external collaborators.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::paths::{default_proxy_config_path, default_storage_root, get_data_dir};

/// First port handed out to instances.
pub const DEFAULT_PORT_BASE: u16 = 9000;

/// Default address of the daemon HTTP API.
pub const DEFAULT_BIND: &str = "127.0.0.1:7080";

/// Reverse proxy the routing rules are rendered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyEngine {
    #[default]
    Nginx,
    Apache,
}

impl fmt::Display for ProxyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nginx => f.write_str("nginx"),
            Self::Apache => f.write_str("apache"),
        }
    }
}

impl FromStr for ProxyEngine {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nginx" => Ok(Self::Nginx),
            "apache" | "apache2" => Ok(Self::Apache),
            other => Err(AppError::config(format!("Unknown proxy engine: {}", other))),
        }
    }
}

/// Credential references handed to the provisioner.
///
/// Only the name of the environment variable holding the password is stored;
/// the secret itself never lands in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_db_user")]
    pub db_user: String,
    #[serde(default = "default_db_password_env")]
    pub db_password_env: String,
}

fn default_db_user() -> String {
    "senex".to_string()
}

fn default_db_password_env() -> String {
    "SENEX_DB_PASSWORD".to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            db_user: default_db_user(),
            db_password_env: default_db_password_env(),
        }
    }
}

/// Host-level settings recorded in each snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub host: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_port_base")]
    pub port_base: u16,
    #[serde(default)]
    pub proxy_engine: ProxyEngine,
    pub proxy_config_path: PathBuf,
    pub storage_root: PathBuf,
    #[serde(default)]
    pub credentials: Credentials,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_listen_port() -> u16 {
    80
}

fn default_port_base() -> u16 {
    DEFAULT_PORT_BASE
}

impl Settings {
    /// Compiled-in defaults rooted at `data_dir`.
    pub fn defaults_for(data_dir: &Path) -> Self {
        Self {
            host: "localhost".to_string(),
            scheme: default_scheme(),
            listen_port: default_listen_port(),
            port_base: default_port_base(),
            proxy_engine: ProxyEngine::default(),
            proxy_config_path: default_proxy_config_path(data_dir),
            storage_root: default_storage_root(data_dir),
            credentials: Credentials::default(),
        }
    }

    /// Names of the fields whose values differ from `other`.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.host != other.host {
            changed.push("host");
        }
        if self.scheme != other.scheme {
            changed.push("scheme");
        }
        if self.listen_port != other.listen_port {
            changed.push("listen_port");
        }
        if self.port_base != other.port_base {
            changed.push("port_base");
        }
        if self.proxy_engine != other.proxy_engine {
            changed.push("proxy_engine");
        }
        if self.proxy_config_path != other.proxy_config_path {
            changed.push("proxy_config_path");
        }
        if self.storage_root != other.storage_root {
            changed.push("storage_root");
        }
        if self.credentials.db_user != other.credentials.db_user {
            changed.push("credentials.db_user");
        }
        if self.credentials.db_password_env != other.credentials.db_password_env {
            changed.push("credentials.db_password_env");
        }
        changed
    }

    /// Public URL under which the namespace is served.
    pub fn public_url(&self, namespace: &str) -> String {
        let default_port = match self.scheme.as_str() {
            "https" => 443,
            _ => 80,
        };
        if self.listen_port == default_port {
            format!("{}://{}/{}/", self.scheme, self.host, namespace)
        } else {
            format!(
                "{}://{}:{}/{}/",
                self.scheme, self.host, self.listen_port, namespace
            )
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::defaults_for(&get_data_dir())
    }
}

/// How the live proxy is told to pick up a new config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadMethod {
    /// Config is written but nothing is signalled.
    #[default]
    None,
    /// Send SIGHUP to the pid recorded in this file.
    Signal(PathBuf),
    /// Run this command (argv form).
    Command(Vec<String>),
}

/// A single dependency check run by the default probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCheck {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub version_args: Vec<String>,
}

impl ProbeCheck {
    fn new(name: &str, program: &str, version_args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            version_args: version_args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_probes() -> Vec<ProbeCheck> {
    vec![
        ProbeCheck::new("Python", "python3", &["--version"]),
        ProbeCheck::new("nginx", "nginx", &["-v"]),
        ProbeCheck::new("Apache", "apache2", &["-v"]),
        ProbeCheck::new("supervisor", "supervisorctl", &["version"]),
        ProbeCheck::new("MySQL", "mysql", &["--version"]),
    ]
}

/// Commands backing the external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub install_command: Vec<String>,
    #[serde(default)]
    pub provision_command: Vec<String>,
    #[serde(default)]
    pub template_archive: Option<PathBuf>,
    #[serde(default)]
    pub supervisor_command: Vec<String>,
    #[serde(default)]
    pub proxy_reload: ReloadMethod,
    #[serde(default = "default_probes")]
    pub probes: Vec<ProbeCheck>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            install_command: Vec::new(),
            provision_command: Vec::new(),
            template_archive: None,
            supervisor_command: Vec::new(),
            proxy_reload: ReloadMethod::None,
            probes: default_probes(),
        }
    }
}

/// Daemon configuration (`senex.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    #[serde(default)]
    pub hooks: HookConfig,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            state_path: None,
            hooks: HookConfig::default(),
        }
    }
}

/// Load the daemon config, falling back to defaults when the file is absent.
pub fn load_daemon_config(path: &Path) -> Result<DaemonConfig> {
    if !path.exists() {
        log::info!("No daemon config at {:?}, using defaults", path);
        return Ok(DaemonConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::config(format!("Failed to read {:?}: {}", path, e)))?;
    toml::from_str(&content).map_err(|e| AppError::config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_fields_lists_only_differences() {
        let base = Settings::defaults_for(Path::new("/data"));
        let mut candidate = base.clone();
        assert!(base.changed_fields(&candidate).is_empty());

        candidate.host = "old.example.org".to_string();
        candidate.proxy_engine = ProxyEngine::Apache;
        assert_eq!(base.changed_fields(&candidate), vec!["host", "proxy_engine"]);
    }

    #[test]
    fn public_url_omits_default_port() {
        let mut settings = Settings::defaults_for(Path::new("/data"));
        settings.host = "old.example.org".to_string();
        assert_eq!(settings.public_url("blaold"), "http://old.example.org/blaold/");

        settings.listen_port = 8080;
        assert_eq!(
            settings.public_url("blaold"),
            "http://old.example.org:8080/blaold/"
        );
    }

    #[test]
    fn daemon_config_parses_partial_toml() {
        let config: DaemonConfig = toml::from_str(
            r#"
bind = "0.0.0.0:9999"

[hooks]
provision_command = ["/usr/local/bin/mkdb"]
proxy_reload = { signal = "/run/nginx.pid" }
"#,
        )
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:9999");
        assert_eq!(config.hooks.provision_command, vec!["/usr/local/bin/mkdb"]);
        assert_eq!(
            config.hooks.proxy_reload,
            ReloadMethod::Signal(PathBuf::from("/run/nginx.pid"))
        );
        assert!(!config.hooks.probes.is_empty());
    }

    #[test]
    fn missing_daemon_config_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_daemon_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn proxy_engine_parses_aliases() {
        assert_eq!("Apache2".parse::<ProxyEngine>().unwrap(), ProxyEngine::Apache);
        assert!("caddy".parse::<ProxyEngine>().is_err());
    }
}
