//! Centralized path utilities for the control plane.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SENEX_HOME";

/// Get the root data directory (`$SENEX_HOME`, else `~/.senex`).
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".senex")
}

/// Get the path to the daemon config file.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("senex.toml")
}

/// Get the path to the persisted registry state.
pub fn state_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state.json")
}

/// Default root under which every instance namespace gets a directory.
pub fn default_storage_root(data_dir: &Path) -> PathBuf {
    data_dir.join("instances")
}

/// Default location of the generated proxy config.
pub fn default_proxy_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("proxy").join("senex.conf")
}

/// Storage directory of a single namespace.
pub fn namespace_dir(storage_root: &Path, namespace: &str) -> PathBuf {
    storage_root.join(namespace)
}

/// Ensure the data directory exists.
pub fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir).map_err(|e| AppError::io(e.to_string()))
}

/// Sibling temp path used while writing `target`.
fn temp_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "senex".to_string());
    target.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()))
}

/// Write `contents` to a sibling temp file, then rename it over `target`.
///
/// Readers of `target` see either the old or the new contents, never a
/// partial write.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("Failed to create {:?}: {}", parent, e)))?;
    }

    let tmp = temp_path_for(target);
    let write_result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp);
        return Err(AppError::io(format!("Failed to write {:?}: {}", tmp, e)));
    }

    fs::rename(&tmp, target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        AppError::io(format!("Failed to move {:?} into place: {}", target, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_contents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("out.conf");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "second");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn namespace_dir_is_under_storage_root() {
        let root = Path::new("/srv/senex");
        assert_eq!(namespace_dir(root, "blaold"), PathBuf::from("/srv/senex/blaold"));
    }
}
