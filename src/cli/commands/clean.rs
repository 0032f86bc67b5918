//! Clean command - remove generated files and the cache

use super::load_project_config;
use crate::cli::CleanArgs;
use crate::config::{resolve_project_dir, CleanConfig};
use crate::error::ProtogenResult;
use crate::generator::clean;
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Execute the clean command
pub async fn execute(args: CleanArgs, project_dir: Option<PathBuf>) -> ProtogenResult<()> {
    let ctx = UiContext::detect();
    let project_dir = resolve_project_dir(project_dir.as_deref())?;
    let loaded = load_project_config(&project_dir).await?;

    let config = CleanConfig {
        project_dir: Some(project_dir),
        cache_file: args.cache_file.unwrap_or(loaded.cache_file),
    };
    let summary = clean(&config).await?;

    if !summary.cache_removed && summary.files_removed == 0 {
        ui::outro_warn(&ctx, "Nothing to clean");
        return Ok(());
    }
    if summary.files_missing > 0 {
        ui::step_warn(
            &ctx,
            &format!("{} recorded file(s) were already gone", summary.files_missing),
        );
    }
    ui::outro_success(
        &ctx,
        &format!("Removed {} generated file(s)", summary.files_removed),
    );
    Ok(())
}
