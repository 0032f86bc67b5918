//! Generation manifest persisted between runs
//!
//! A damaged or outdated manifest is never an error: it loads as an empty
//! cache and the next run regenerates everything.

use crate::cache::hash::hash_proto_files;
use crate::error::{ProtogenError, ProtogenResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Current manifest format version
pub const CACHE_VERSION: u32 = 2;

/// The protoc manifest cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cache {
    /// Manifest format version
    pub version: u32,

    /// Digest of the full protoc flag list
    #[serde(default)]
    pub protoc_flags_hash: String,

    /// Summary of code generator versions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_versions: String,

    /// Package key to package state
    #[serde(default)]
    pub packages: BTreeMap<String, PackageInfo>,
}

/// Cached state of one source directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Content digest over the package's proto files
    pub hash: String,

    /// Generated files, relative to the project
    #[serde(default)]
    pub generated_files: Vec<String>,

    /// Proto files that were hashed, in discovery order
    #[serde(default)]
    pub proto_files: Vec<String>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Create an empty cache at the current version
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            protoc_flags_hash: String::new(),
            tool_versions: String::new(),
            packages: BTreeMap::new(),
        }
    }

    /// Load the cache from disk.
    ///
    /// Missing, unreadable, malformed, or version-mismatched files all
    /// produce an empty cache.
    pub async fn load(path: &Path) -> Self {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache at {}, starting fresh", path.display());
                return Self::new();
            }
            Err(e) => {
                warn!("Cannot read cache {}: {}", path.display(), e);
                return Self::new();
            }
        };

        let cache: Cache = match serde_json::from_slice(&data) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Ignoring corrupt cache {}: {}", path.display(), e);
                return Self::new();
            }
        };

        if cache.version != CACHE_VERSION {
            debug!(
                "Cache version {} does not match {}, starting fresh",
                cache.version, CACHE_VERSION
            );
            return Self::new();
        }

        cache
    }

    /// Write the cache next to its final location, then rename over it
    pub async fn save(&self, path: &Path) -> ProtogenResult<()> {
        let content = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");

        let map_err = |source| ProtogenError::CacheSave {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&tmp, content).await.map_err(map_err)?;
        fs::rename(&tmp, path).await.map_err(map_err)?;

        debug!("Saved cache with {} packages", self.packages.len());
        Ok(())
    }

    /// Record the digest of the protoc flags used for this run
    pub fn set_flags_hash(&mut self, flags_hash: impl Into<String>) {
        self.protoc_flags_hash = flags_hash.into();
    }

    /// Record the generator versions used for this run
    pub fn set_tool_versions(&mut self, versions: impl Into<String>) {
        self.tool_versions = versions.into();
    }

    /// Check whether a package must be regenerated.
    ///
    /// Any read failure while hashing counts as stale.
    pub fn needs_regeneration(
        &self,
        package_key: &str,
        proto_files: &[String],
        project_dir: &Path,
        flags_hash: &str,
        force: bool,
    ) -> bool {
        if force {
            return true;
        }

        if self.protoc_flags_hash != flags_hash {
            return true;
        }

        let Some(info) = self.packages.get(package_key) else {
            return true;
        };

        // Order-sensitive on purpose: a reordered list is a miss.
        if info.proto_files != proto_files {
            return true;
        }

        match hash_proto_files(proto_files, project_dir) {
            Ok(hash) => info.hash != hash,
            Err((path, e)) => {
                debug!("Hashing {} failed ({}), treating as stale", path.display(), e);
                true
            }
        }
    }

    /// Replace a package entry after generation
    pub fn update_package(
        &mut self,
        package_key: &str,
        proto_files: &[String],
        generated_files: Vec<String>,
        project_dir: &Path,
    ) -> ProtogenResult<()> {
        let hash = hash_proto_files(proto_files, project_dir)
            .map_err(|(path, source)| ProtogenError::Hash { path, source })?;

        self.packages.insert(
            package_key.to_string(),
            PackageInfo {
                hash,
                generated_files,
                proto_files: proto_files.to_vec(),
            },
        );
        Ok(())
    }

    /// Drop packages whose key is not in `current_keys`
    pub fn clean_orphans(&mut self, current_keys: &HashSet<String>) {
        self.packages.retain(|key, _| {
            let keep = current_keys.contains(key);
            if !keep {
                debug!("Removing orphaned package {}", key);
            }
            keep
        });
    }
}
