//! Staging link from `vendor/<module>` to the project
//!
//! Inputs are addressed by their canonical module path under `vendor/`,
//! so the project itself has to appear there while the compiler runs.

use crate::error::{ProtogenError, ProtogenResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Symlink that is removed when dropped
#[derive(Debug)]
pub struct StagingLink {
    path: PathBuf,
}

impl StagingLink {
    /// Link `<vendor_dir>/<module_path>` to `project_dir`.
    ///
    /// A stale link from an aborted run is replaced; anything else at that
    /// path is left alone and reported.
    pub fn create(vendor_dir: &Path, module_path: &str, project_dir: &Path) -> ProtogenResult<Self> {
        let path = vendor_dir.join(module_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProtogenError::io(format!("creating {}", parent.display()), e)
            })?;
        }

        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                debug!("Replacing stale staging link {}", path.display());
                remove_link(&path)
                    .map_err(|e| ProtogenError::io(format!("removing {}", path.display()), e))?;
            }
            Ok(_) => {
                return Err(ProtogenError::PathInvalid {
                    path,
                    reason: "exists and is not a symlink; remove it to allow staging".to_string(),
                });
            }
            Err(_) => {}
        }

        symlink_dir(project_dir, &path)
            .map_err(|e| ProtogenError::io(format!("linking {}", path.display()), e))?;
        debug!("Staged {} -> {}", path.display(), project_dir.display());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingLink {
    fn drop(&mut self) {
        if let Err(e) = remove_link(&self.path) {
            warn!("Failed to remove staging link {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
fn remove_link(link: &Path) -> std::io::Result<()> {
    std::fs::remove_file(link)
}

#[cfg(windows)]
fn remove_link(link: &Path) -> std::io::Result<()> {
    std::fs::remove_dir(link)
}
