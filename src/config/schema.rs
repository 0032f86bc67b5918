//! Project-local configuration schema
//!
//! Stored at `{project_dir}/.protogen.toml`. Every key is optional; absent
//! keys fall back to the built-in defaults and CLI flags override both.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root of `.protogen.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Generation settings
    pub generate: GenerateSection,

    /// Sandbox module locations
    pub sandbox: SandboxSection,
}

/// `[generate]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateSection {
    /// Proto file patterns to include
    pub targets: Option<Vec<String>>,

    /// Proto file patterns to exclude
    pub exclude: Option<Vec<String>>,

    /// go-lite feature selector
    pub features: Option<String>,

    /// Tools directory, relative to the project
    pub tools_dir: Option<PathBuf>,

    /// Cache manifest file, relative to the project
    pub cache_file: Option<PathBuf>,

    /// Extra arguments appended to every protoc invocation
    pub extra_args: Vec<String>,
}

/// `[sandbox]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// WASI build of protoc
    pub protoc_module: Option<PathBuf>,

    /// WASI build of protoc-gen-prost, run in-process
    pub prost_module: Option<PathBuf>,
}
