//! Rust output relocation
//!
//! prost names its output after the proto package. Files are moved next
//! to the other ecosystems' outputs for the same source directory.

use crate::error::{ProtogenError, ProtogenResult};
use crate::postprocess::paths::prost_output_path;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Matches `package foo.bar;`
pub fn package_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"(?m)^\s*package\s+([A-Za-z_][A-Za-z0-9_.]*)\s*;")
}

/// Proto package declared in `content`
pub fn proto_package<'a>(content: &'a str, pattern: &Regex) -> Option<&'a str> {
    pattern
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Move the prost output for one proto into place.
///
/// Returns the new location when a file was moved.
pub async fn relocate(
    vendor_dir: &Path,
    package: Option<&str>,
    base_name: &str,
    destination: &Path,
) -> ProtogenResult<Option<PathBuf>> {
    let source = prost_output_path(vendor_dir, package, base_name);
    if !fs::try_exists(&source).await.unwrap_or(false) {
        return Ok(None);
    }
    if same_file(&source, destination).await {
        return Ok(None);
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ProtogenError::post_process(destination, e))?;
    }
    debug!("Moving {} -> {}", source.display(), destination.display());
    fs::rename(&source, destination)
        .await
        .map_err(|e| ProtogenError::post_process(&source, e))?;

    if let Some(parent) = source.parent() {
        prune_empty_dirs(parent, vendor_dir).await;
    }
    Ok(Some(destination.to_path_buf()))
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Remove empty directories from `start` upward, stopping below `root`
pub async fn prune_empty_dirs(start: &Path, root: &Path) {
    let mut dir = start.to_path_buf();
    while dir.starts_with(root) && dir != root {
        if fs::remove_dir(&dir).await.is_err() {
            break;
        }
        debug!("Pruned empty directory {}", dir.display());
        if !dir.pop() {
            break;
        }
    }
}
