//! CLI command implementations

pub mod clean;
pub mod deps;
pub mod generate;

pub use clean::execute as clean;
pub use deps::execute as deps;
pub use generate::execute as generate;

use crate::config::{ConfigManager, GenerateConfig, ProjectConfig};
use crate::error::ProtogenResult;
use std::path::Path;
use tracing::debug;

/// Defaults overlaid with `.protogen.toml`, when the project has one
pub(crate) async fn load_project_config(project_dir: &Path) -> ProtogenResult<GenerateConfig> {
    let project = match ConfigManager::find_local_config(project_dir) {
        Some(path) => {
            debug!("Found local config: {}", path.display());
            ConfigManager::with_path(path).load().await?
        }
        None => ProjectConfig::default(),
    };
    let mut config = GenerateConfig::from_project(&project);
    config.project_dir = Some(project_dir.to_path_buf());
    Ok(config)
}
