//! Safe tar.gz extraction for instance templates.
//!
//! Only directories and regular files are materialized. Links, devices and
//! any entry whose path is absolute or climbs out of the destination abort
//! the extraction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

fn has_windows_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

/// Convert an archive entry path to a relative PathBuf, rejecting empty,
/// absolute or traversal paths.
pub(crate) fn parse_entry_rel_path(raw: &str) -> Option<PathBuf> {
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') || has_windows_drive_prefix(&normalized) {
        return None;
    }

    let mut relative = PathBuf::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            _ => relative.push(part),
        }
    }

    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative)
}

/// Top-level directory shared by every entry, if there is exactly one and
/// at least one entry is nested below it.
fn common_top_dir<'a>(paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut candidate: Option<PathBuf> = None;
    let mut saw_nested = false;
    for path in paths {
        let mut components = path.components();
        let first = PathBuf::from(components.next()?.as_os_str());
        if components.next().is_some() {
            saw_nested = true;
        }
        match &candidate {
            Some(existing) if *existing != first => return None,
            Some(_) => {}
            None => candidate = Some(first),
        }
    }
    candidate.filter(|_| saw_nested)
}

/// Ensure `path` (whose parent already exists) stays under `base`.
fn check_within(base: &Path, path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::io(format!("archive entry {path:?} has no parent")))?;
    let canonical_parent = parent
        .canonicalize()
        .map_err(|e| AppError::io(format!("failed to canonicalize {parent:?}: {e}")))?;
    if !canonical_parent.starts_with(base) {
        return Err(AppError::io(format!(
            "archive entry {path:?} escapes destination"
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
            .map_err(|e| AppError::io(format!("failed to set permissions on {path:?}: {e}")))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_unix_permissions(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

fn open_archive(archive_path: &Path) -> Result<tar::Archive<flate2::read::GzDecoder<fs::File>>> {
    let file = fs::File::open(archive_path)
        .map_err(|e| AppError::io(format!("failed to open {archive_path:?}: {e}")))?;
    Ok(tar::Archive::new(flate2::read::GzDecoder::new(file)))
}

/// Extract `archive_path` into `dest_dir`, stripping a single common
/// top-level directory if the archive has one.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    // First pass: validate every path and find the common top directory.
    let mut relative_paths = Vec::new();
    for entry in open_archive(archive_path)?
        .entries()
        .map_err(|e| AppError::io(e.to_string()))?
    {
        let entry = entry.map_err(|e| AppError::io(e.to_string()))?;
        let raw = entry
            .path()
            .map_err(|e| AppError::io(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let relative = parse_entry_rel_path(&raw).ok_or_else(|| {
            AppError::io(format!("archive contains unsafe entry path: {raw:?}"))
        })?;
        relative_paths.push(relative);
    }
    let top_dir = common_top_dir(relative_paths.iter().map(PathBuf::as_path));

    fs::create_dir_all(dest_dir)
        .map_err(|e| AppError::io(format!("failed to create {dest_dir:?}: {e}")))?;
    let base = dest_dir
        .canonicalize()
        .map_err(|e| AppError::io(format!("failed to canonicalize {dest_dir:?}: {e}")))?;

    let mut archive = open_archive(archive_path)?;
    let entries = archive.entries().map_err(|e| AppError::io(e.to_string()))?;
    for (entry, relative) in entries.zip(relative_paths) {
        let mut entry = entry.map_err(|e| AppError::io(e.to_string()))?;
        let relative = match &top_dir {
            Some(top) => match relative.strip_prefix(top) {
                Ok(stripped) if stripped.as_os_str().is_empty() => continue,
                Ok(stripped) => stripped.to_path_buf(),
                Err(_) => relative,
            },
            None => relative,
        };
        let out_path = base.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| AppError::io(format!("failed to create {out_path:?}: {e}")))?;
            check_within(&base, &out_path)?;
            continue;
        }
        if !entry_type.is_file() {
            return Err(AppError::io(format!(
                "unsupported tar entry type at {relative:?}: {entry_type:?}"
            )));
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io(format!("failed to create {parent:?}: {e}")))?;
        }
        check_within(&base, &out_path)?;

        let declared_size = entry
            .header()
            .size()
            .map_err(|e| AppError::io(e.to_string()))?;
        let unix_mode = entry.header().mode().ok();
        let mut outfile = fs::File::create(&out_path)
            .map_err(|e| AppError::io(format!("failed to create {out_path:?}: {e}")))?;
        let written = io::copy(&mut entry, &mut outfile).map_err(|e| AppError::io(e.to_string()))?;
        if written != declared_size {
            return Err(AppError::io(format!(
                "archive entry size mismatch: expected {declared_size} bytes, wrote {written} bytes",
            )));
        }
        set_unix_permissions(&out_path, unix_mode)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn build_archive(path: &Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(parse_entry_rel_path("../etc/passwd").is_none());
        assert!(parse_entry_rel_path("/etc/passwd").is_none());
        assert!(parse_entry_rel_path("C:/boot.ini").is_none());
        assert!(parse_entry_rel_path("./").is_none());
        assert_eq!(
            parse_entry_rel_path("./app/run.py"),
            Some(PathBuf::from("app/run.py"))
        );
    }

    #[test]
    fn strips_common_top_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("template.tar.gz");
        build_archive(
            &archive,
            &[
                ("template/app.ini", b"[app]\n"),
                ("template/static/index.html", b"<html></html>"),
            ],
        );

        let dest = dir.path().join("out");
        extract_tar_gz(&archive, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("app.ini")).unwrap(), "[app]\n");
        assert!(dest.join("static/index.html").is_file());
        assert!(!dest.join("template").exists());
    }

    #[test]
    fn keeps_layout_without_common_top_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("template.tar.gz");
        build_archive(&archive, &[("a.txt", b"a"), ("b/c.txt", b"c")]);

        let dest = dir.path().join("out");
        extract_tar_gz(&archive, &dest).unwrap();

        assert!(dest.join("a.txt").is_file());
        assert!(dest.join("b/c.txt").is_file());
    }

    #[test]
    fn missing_archive_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_tar_gz(&dir.path().join("nope.tar.gz"), dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}
