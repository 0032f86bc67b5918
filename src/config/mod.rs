//! Configuration for generation runs
//!
//! Values are layered: built-in defaults, then the project-local
//! `.protogen.toml`, then CLI flags.

pub mod schema;

pub use schema::ProjectConfig;

use crate::error::{ProtogenError, ProtogenResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Default cache manifest file name
pub const DEFAULT_CACHE_FILE: &str = ".protoc-manifest.json";

/// Default go-lite features
pub const DEFAULT_GO_LITE_FEATURES: &str = "marshal+unmarshal+size+equal+json+clone+text";

/// Default tools directory
pub const DEFAULT_TOOLS_DIR: &str = ".tools";

/// Default include pattern
pub const DEFAULT_TARGET: &str = "./*.proto";

/// Project-local config file name
pub const LOCAL_CONFIG_FILE: &str = ".protogen.toml";

/// Loads `.protogen.toml`
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Find the project-local config file, if any
    pub fn find_local_config(project_dir: &Path) -> Option<PathBuf> {
        let path = project_dir.join(LOCAL_CONFIG_FILE);
        path.is_file().then_some(path)
    }

    /// Load the config, returning defaults when the file does not exist
    pub async fn load(&self) -> ProtogenResult<ProjectConfig> {
        if !self.config_path.exists() {
            debug!("No {} found, using defaults", self.config_path.display());
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).await.map_err(|e| {
            ProtogenError::io(format!("reading config {}", self.config_path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| ProtogenError::ConfigInvalid {
            path: self.config_path.clone(),
            reason: e.to_string(),
        })
    }

}

/// Resolve the project directory to an absolute, symlink-free path.
///
/// Falls back to the current directory when none is given.
pub fn resolve_project_dir(dir: Option<&Path>) -> ProtogenResult<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()
            .map_err(|e| ProtogenError::io("getting current directory", e))?,
    };
    dir.canonicalize()
        .map_err(|source| ProtogenError::ProjectDir { path: dir, source })
}

/// Configuration for one `generate` run
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Project directory (defaults to the current directory)
    pub project_dir: Option<PathBuf>,

    /// Proto file patterns to include
    pub targets: Vec<String>,

    /// Proto file patterns to exclude
    pub exclude: Vec<String>,

    /// Regenerate everything regardless of the cache
    pub force: bool,

    /// Cache manifest path, relative to the project
    pub cache_file: PathBuf,

    /// go-lite feature selector
    pub features: String,

    /// Tools directory, relative to the project
    pub tools_dir: PathBuf,

    /// Arguments passed verbatim to protoc
    pub extra_args: Vec<String>,

    /// Override for the protoc WASI module
    pub protoc_module: Option<PathBuf>,

    /// Override for the embedded prost WASI module
    pub prost_module: Option<PathBuf>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            project_dir: None,
            targets: vec![DEFAULT_TARGET.to_string()],
            exclude: vec![],
            force: false,
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            features: DEFAULT_GO_LITE_FEATURES.to_string(),
            tools_dir: PathBuf::from(DEFAULT_TOOLS_DIR),
            extra_args: vec![],
            protoc_module: None,
            prost_module: None,
        }
    }
}

impl GenerateConfig {
    /// Build a config from defaults overlaid with the project file
    pub fn from_project(project: &ProjectConfig) -> Self {
        let mut config = Self::default();
        let section = &project.generate;

        if let Some(ref targets) = section.targets {
            config.targets = targets.clone();
        }
        if let Some(ref exclude) = section.exclude {
            config.exclude = exclude.clone();
        }
        if let Some(ref features) = section.features {
            config.features = features.clone();
        }
        if let Some(ref tools_dir) = section.tools_dir {
            config.tools_dir = tools_dir.clone();
        }
        if let Some(ref cache_file) = section.cache_file {
            config.cache_file = cache_file.clone();
        }
        config.extra_args = section.extra_args.clone();
        config.protoc_module = project.sandbox.protoc_module.clone();
        config.prost_module = project.sandbox.prost_module.clone();
        config
    }

    /// Resolve the project directory
    pub fn resolve_project_dir(&self) -> ProtogenResult<PathBuf> {
        resolve_project_dir(self.project_dir.as_deref())
    }

    /// Absolute cache manifest path
    pub fn cache_file_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.cache_file)
    }

    /// Absolute tools directory
    pub fn tools_dir_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.tools_dir)
    }

    /// Absolute path of the protoc WASI module
    pub fn protoc_module_path(&self, project_dir: &Path) -> PathBuf {
        match self.protoc_module {
            Some(ref path) => project_dir.join(path),
            None => self
                .tools_dir_path(project_dir)
                .join("wasm")
                .join("protoc.wasm"),
        }
    }

    /// Absolute path of the embedded prost WASI module
    pub fn prost_module_path(&self, project_dir: &Path) -> PathBuf {
        match self.prost_module {
            Some(ref path) => project_dir.join(path),
            None => self
                .tools_dir_path(project_dir)
                .join("wasm")
                .join("protoc-gen-prost.wasm"),
        }
    }
}

/// Configuration for `clean`
#[derive(Debug, Clone)]
pub struct CleanConfig {
    /// Project directory (defaults to the current directory)
    pub project_dir: Option<PathBuf>,

    /// Cache manifest path, relative to the project
    pub cache_file: PathBuf,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            project_dir: None,
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
        }
    }
}
