//! Shelling out to operator-configured commands.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Installer, Supervisor};
use crate::config::Settings;

/// Upper bound for install/provision/reload commands.
pub(crate) const COMMAND_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Run `argv` to completion, returning its trimmed stdout and stderr joined
/// by a newline. A non-zero exit becomes an error carrying stderr (or stdout
/// when stderr is empty).
pub(crate) async fn run_command(
    argv: &[String],
    envs: &[(&str, &str)],
    timeout: Duration,
) -> Result<String, String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| "no command configured".to_string())?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    log::debug!("Running {}", argv.join(" "));
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| format!("{} timed out after {}s", program, timeout.as_secs()))?
        .map_err(|e| format!("Failed to run {}: {}", program, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let detail = if stderr.is_empty() { stdout.as_str() } else { stderr.as_str() };
        return Err(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            if detail.is_empty() {
                "(no output)"
            } else {
                detail
            }
        ));
    }

    Ok(match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout,
        (true, false) => stderr,
        (false, false) => format!("{}\n{}", stdout, stderr),
    })
}

/// Runs the configured install command with the settings exported as
/// environment variables.
pub struct CommandInstaller {
    argv: Vec<String>,
}

impl CommandInstaller {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, settings: &Settings) -> Result<(), String> {
        if self.argv.is_empty() {
            return Err("no install_command configured in [hooks]".to_string());
        }
        let engine = settings.proxy_engine.to_string();
        let storage_root = settings.storage_root.to_string_lossy();
        run_command(
            &self.argv,
            &[
                ("SENEX_PROXY_ENGINE", engine.as_str()),
                ("SENEX_STORAGE_ROOT", &*storage_root),
                ("SENEX_DB_USER", settings.credentials.db_user.as_str()),
            ],
            COMMAND_TIMEOUT,
        )
        .await
        .map(|out| log::info!("Install command finished: {}", out))
    }
}

/// Asks the process supervisor to re-read its program list.
pub struct CommandSupervisor {
    argv: Vec<String>,
}

impl CommandSupervisor {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl Supervisor for CommandSupervisor {
    async fn reload(&self) -> Result<(), String> {
        if self.argv.is_empty() {
            log::debug!("No supervisor_command configured, skipping supervisor reload");
            return Ok(());
        }
        run_command(&self.argv, &[], COMMAND_TIMEOUT)
            .await
            .map(|_| ())
    }
}
