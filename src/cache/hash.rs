//! Content digests for cache invalidation
//!
//! Source digests cover `path, bytes` pairs in path order, so discovery
//! order does not matter and a pure rename still changes the digest.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hash the given project-relative files.
///
/// On failure returns the path that could not be read.
pub fn hash_proto_files(
    proto_files: &[String],
    project_dir: &Path,
) -> Result<String, (PathBuf, std::io::Error)> {
    let mut sorted: Vec<&String> = proto_files.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for file in sorted {
        let path = project_dir.join(file);
        let data = std::fs::read(&path).map_err(|e| (path, e))?;
        hasher.update(file.as_bytes());
        hasher.update(&data);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash a list of strings (compiler flags).
///
/// Each element is NUL-terminated so element boundaries are part of the digest.
pub fn hash_strings<S: AsRef<str>>(strs: &[S]) -> String {
    let mut hasher = Sha256::new();
    for s in strs {
        hasher.update(s.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
