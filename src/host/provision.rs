use std::path::Path;

use async_trait::async_trait;

use super::command::{run_command, COMMAND_TIMEOUT};
use super::Provisioner;
use crate::config::Credentials;

/// Creates the namespace directory, then runs the optional provisioning
/// command (typically database and user creation) with the namespace as its
/// last argument.
///
/// The command sees `SENEX_NAMESPACE`, `SENEX_DATA_DIR`, `SENEX_DB_USER` and,
/// when the referenced variable is set, `SENEX_DB_PASSWORD`.
pub struct StorageProvisioner {
    argv: Vec<String>,
}

impl StorageProvisioner {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Provisioner for StorageProvisioner {
    async fn provision(
        &self,
        namespace: &str,
        dir: &Path,
        credentials: &Credentials,
    ) -> Result<(), String> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;

        if self.argv.is_empty() {
            return Ok(());
        }

        let password = std::env::var(&credentials.db_password_env).ok();
        if password.is_none() {
            log::warn!(
                "{} is not set, provisioning {} without a database password",
                credentials.db_password_env,
                namespace
            );
        }

        let data_dir = dir.to_string_lossy();
        let mut envs = vec![
            ("SENEX_NAMESPACE", namespace),
            ("SENEX_DATA_DIR", &*data_dir),
            ("SENEX_DB_USER", credentials.db_user.as_str()),
        ];
        if let Some(password) = password.as_deref() {
            envs.push(("SENEX_DB_PASSWORD", password));
        }

        let mut argv = self.argv.clone();
        argv.push(namespace.to_string());
        run_command(&argv, &envs, COMMAND_TIMEOUT).await.map(|_| ())
    }
}
