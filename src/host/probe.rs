//! Default dependency probe: PATH lookup plus a version query.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::command::run_command;
use super::DependencyProbe;
use crate::config::ProbeCheck;
use crate::registry::Dependency;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CommandProbe {
    checks: Vec<ProbeCheck>,
}

impl CommandProbe {
    pub fn new(checks: Vec<ProbeCheck>) -> Self {
        Self { checks }
    }

    async fn check(check: &ProbeCheck) -> Dependency {
        let Some(program) = find_program(&check.program) else {
            return Dependency {
                name: check.name.clone(),
                installed: false,
                version: None,
            };
        };

        let mut argv = vec![program.to_string_lossy().into_owned()];
        argv.extend(check.version_args.iter().cloned());
        let version = match run_command(&argv, &[], PROBE_TIMEOUT).await {
            Ok(output) => parse_version(&output),
            Err(e) => {
                log::debug!("Version query for {} failed: {}", check.name, e);
                None
            }
        };

        Dependency {
            name: check.name.clone(),
            installed: true,
            version,
        }
    }
}

#[async_trait]
impl DependencyProbe for CommandProbe {
    async fn probe(&self) -> Vec<Dependency> {
        let mut dependencies = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            dependencies.push(Self::check(check).await);
        }
        dependencies
    }
}

/// Resolve `program` to an executable file, searching PATH for bare names.
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// First token that looks like a dotted version number.
fn parse_version(output: &str) -> Option<String> {
    output
        .split(|c: char| c.is_whitespace() || c == '/' || c == '(' || c == ',')
        .map(|token| token.trim_start_matches(['v', 'V']))
        .find(|token| {
            token.starts_with(|c: char| c.is_ascii_digit())
                && token.contains('.')
                && token.chars().all(|c| c.is_ascii_digit() || c == '.')
        })
        .map(|token| token.trim_end_matches('.').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_version_banners() {
        assert_eq!(parse_version("Python 3.11.4").as_deref(), Some("3.11.4"));
        assert_eq!(
            parse_version("nginx version: nginx/1.24.0").as_deref(),
            Some("1.24.0")
        );
        assert_eq!(
            parse_version("Server version: Apache/2.4.57 (Debian)").as_deref(),
            Some("2.4.57")
        );
        assert_eq!(
            parse_version("mysql  Ver 8.0.33 for Linux on x86_64").as_deref(),
            Some("8.0.33")
        );
        assert_eq!(parse_version("no digits here"), None);
    }

    #[tokio::test]
    async fn missing_program_is_reported_not_installed() {
        let probe = CommandProbe::new(vec![ProbeCheck {
            name: "Nothing".to_string(),
            program: "senex-definitely-not-installed".to_string(),
            version_args: Vec::new(),
        }]);
        let deps = probe.probe().await;
        assert_eq!(
            deps,
            vec![Dependency {
                name: "Nothing".to_string(),
                installed: false,
                version: None,
            }]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn installed_program_reports_version() {
        let probe = CommandProbe::new(vec![ProbeCheck {
            name: "Shell".to_string(),
            program: "sh".to_string(),
            version_args: vec!["-c".to_string(), "echo tool 2.4.1".to_string()],
        }]);
        let deps = probe.probe().await;
        assert!(deps[0].installed);
        assert_eq!(deps[0].version.as_deref(), Some("2.4.1"));
    }
}
