//! On-disk layout of an extracted AppImage.
//!
//! The AppImage is an opaque self-extracting archive: we never parse it, we
//! run `--appimage-extract` and inspect the tree it leaves behind.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::{ProvisionError, CONVENTIONAL_DATA_DIR, DATA_DIR_MARKER, ENTRY_POINT};

/// Directory `--appimage-extract` creates in its working directory.
const APPIMAGE_PAYLOAD_DIR: &str = "squashfs-root";

/// Working directory for the extractor, next to the final extraction.
const STAGING_DIR_NAME: &str = "staging";

pub(crate) fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

pub(crate) async fn mark_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
    }
    #[cfg(not(unix))]
    {
        tokio::fs::metadata(path).await.map(|_| ())
    }
}

async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn setup_error(action: &str, path: &Path, e: io::Error) -> ProvisionError {
    ProvisionError::SetupError(format!("cannot {action} '{}': {e}", path.display()))
}

/// Runs `artifact --appimage-extract` and moves the payload to `extracted_dir`.
///
/// Any earlier extraction is removed first. Returns the entry point path.
pub(crate) async fn extract_appimage(
    artifact: &Path,
    cache_dir: &Path,
    extracted_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, ProvisionError> {
    let staging = cache_dir.join(STAGING_DIR_NAME);
    remove_dir_if_exists(&staging)
        .await
        .map_err(|e| setup_error("clear", &staging, e))?;
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(|e| setup_error("create", &staging, e))?;

    info!("Extracting {}", artifact.display());

    let child = Command::new(artifact)
        .arg("--appimage-extract")
        .current_dir(&staging)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            ProvisionError::ExtractionFailed(format!("cannot start '{}': {e}", artifact.display()))
        })?;

    // On timeout the child is dropped, which kills it.
    let waited = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => Err(format!(
            "extractor exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )),
        Ok(Err(e)) => Err(format!("waiting for extractor: {e}")),
        Err(_) => Err(format!("timed out after {timeout:?}")),
    };

    let payload = staging.join(APPIMAGE_PAYLOAD_DIR);
    let failure = match waited {
        Err(reason) => Some(reason),
        Ok(()) if !payload.is_dir() => Some(format!(
            "no '{APPIMAGE_PAYLOAD_DIR}' produced in {}",
            staging.display()
        )),
        Ok(()) => None,
    };
    if let Some(reason) = failure {
        let _ = remove_dir_if_exists(&staging).await;
        return Err(ProvisionError::ExtractionFailed(reason));
    }

    remove_dir_if_exists(extracted_dir)
        .await
        .map_err(|e| setup_error("remove", extracted_dir, e))?;
    tokio::fs::rename(&payload, extracted_dir)
        .await
        .map_err(|e| setup_error("move payload to", extracted_dir, e))?;
    let _ = remove_dir_if_exists(&staging).await;

    let entry = extracted_dir.join(ENTRY_POINT);
    if !entry.is_file() {
        return Err(ProvisionError::ExtractionFailed(format!(
            "entry point {ENTRY_POINT} not found at {}",
            entry.display()
        )));
    }

    debug!("Extracted to {}", extracted_dir.display());
    Ok(entry)
}

/// Finds the pdf2htmlEX data directory below `root`.
///
/// Checks [`CONVENTIONAL_DATA_DIR`] first, then walks at most `max_depth`
/// levels (in file-name order) for a file named [`DATA_DIR_MARKER`] and
/// returns its parent.
pub fn find_resource_dir(root: &Path, max_depth: usize) -> Option<PathBuf> {
    let conventional = root.join(CONVENTIONAL_DATA_DIR);
    if conventional.is_dir() {
        return Some(conventional);
    }

    WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == DATA_DIR_MARKER)
        .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn conventional_data_dir_wins() {
        let root = tempfile::tempdir().unwrap();
        let conventional = root.path().join(CONVENTIONAL_DATA_DIR);
        fs::create_dir_all(&conventional).unwrap();
        // A marker elsewhere must not be preferred.
        fs::create_dir_all(root.path().join("opt/share")).unwrap();
        fs::write(root.path().join("opt/share/manifest"), b"").unwrap();

        assert_eq!(find_resource_dir(root.path(), 8), Some(conventional));
    }

    #[test]
    fn falls_back_to_marker_scan() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("usr/share/pdf2htmlEX");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join(DATA_DIR_MARKER), b"# manifest").unwrap();

        assert_eq!(find_resource_dir(root.path(), 8), Some(data));
    }

    #[test]
    fn marker_directory_does_not_count() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a").join(DATA_DIR_MARKER)).unwrap();

        assert_eq!(find_resource_dir(root.path(), 8), None);
    }

    #[test]
    fn scan_is_depth_bounded() {
        let root = tempfile::tempdir().unwrap();
        let deep = root.path().join("a/b/c/d");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join(DATA_DIR_MARKER), b"").unwrap();

        // The marker sits at depth 5.
        assert_eq!(find_resource_dir(root.path(), 4), None);
        assert_eq!(find_resource_dir(root.path(), 5), Some(deep));
    }

    #[test]
    fn missing_root_yields_none() {
        assert_eq!(find_resource_dir(Path::new("/definitely/not/here"), 8), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn mark_executable_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tool");
        fs::write(&file, b"#!/bin/sh\n").unwrap();
        assert!(!is_executable(&file));

        mark_executable(&file).await.unwrap();
        assert!(is_executable(&file));
        assert!(!is_executable(dir.path()));
    }
}
