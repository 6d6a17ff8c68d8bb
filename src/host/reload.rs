//! Proxy reload strategies.

use std::path::PathBuf;

use async_trait::async_trait;

use super::command::{run_command, COMMAND_TIMEOUT};
use super::ProxyReloader;

/// Config is installed but nobody is told.
pub struct NoopReloader;

#[async_trait]
impl ProxyReloader for NoopReloader {
    async fn reload(&self) -> Result<(), String> {
        log::debug!("Proxy reload disabled, config picked up on next proxy restart");
        Ok(())
    }
}

/// Sends SIGHUP to the pid recorded in a pid file, the way nginx and
/// apache expect a graceful reload.
pub struct SignalReloader {
    pid_file: PathBuf,
}

impl SignalReloader {
    pub fn new(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    async fn read_pid(&self) -> Result<i32, String> {
        let content = tokio::fs::read_to_string(&self.pid_file)
            .await
            .map_err(|e| format!("Failed to read pid file {}: {}", self.pid_file.display(), e))?;
        content
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or_else(|| {
                format!(
                    "Pid file {} does not contain a pid",
                    self.pid_file.display()
                )
            })
    }
}

#[cfg(unix)]
fn send_sighup(pid: i32) -> Result<(), String> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), Signal::SIGHUP)
        .map_err(|e| format!("Failed to send SIGHUP to PID {}: {}", pid, e))
}

#[cfg(not(unix))]
fn send_sighup(_pid: i32) -> Result<(), String> {
    Err("signal reload is only supported on unix hosts".to_string())
}

#[async_trait]
impl ProxyReloader for SignalReloader {
    async fn reload(&self) -> Result<(), String> {
        let pid = self.read_pid().await?;
        send_sighup(pid)?;
        log::info!("Sent SIGHUP to proxy (PID {})", pid);
        Ok(())
    }
}

/// Runs a reload command such as `nginx -s reload`.
pub struct CommandReloader {
    argv: Vec<String>,
}

impl CommandReloader {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl ProxyReloader for CommandReloader {
    async fn reload(&self) -> Result<(), String> {
        run_command(&self.argv, &[], COMMAND_TIMEOUT)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_pid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = SignalReloader::new(dir.path().join("nginx.pid"))
            .reload()
            .await
            .unwrap_err();
        assert!(err.contains("pid file"), "{err}");
    }

    #[tokio::test]
    async fn garbage_pid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("nginx.pid");
        std::fs::write(&pid_file, "not-a-pid\n").unwrap();
        let err = SignalReloader::new(pid_file).reload().await.unwrap_err();
        assert!(err.contains("does not contain a pid"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_reloader_propagates_failure() {
        let reloader = CommandReloader::new(vec!["false".to_string()]);
        assert!(reloader.reload().await.is_err());
    }

    #[tokio::test]
    async fn noop_reloader_succeeds() {
        assert!(NoopReloader.reload().await.is_ok());
    }
}
