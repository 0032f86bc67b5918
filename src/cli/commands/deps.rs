//! Deps command - build the code generators

use super::load_project_config;
use crate::cli::DepsArgs;
use crate::config::resolve_project_dir;
use crate::error::ProtogenResult;
use crate::tools::{ensure_deps, DepsConfig};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::PathBuf;

/// Execute the deps command
pub async fn execute(args: DepsArgs, project_dir: Option<PathBuf>) -> ProtogenResult<()> {
    let ctx = UiContext::detect();
    let project_dir = resolve_project_dir(project_dir.as_deref())?;
    let mut config = load_project_config(&project_dir).await?;
    if let Some(tools_dir) = args.tools_dir {
        config.tools_dir = tools_dir;
    }

    let deps = DepsConfig {
        tools_dir: config.tools_dir_path(&project_dir),
        protoc_module: config.protoc_module_path(&project_dir),
        project_dir,
        force: args.force,
    };

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Building generators...");
    let summary = match ensure_deps(&deps).await {
        Ok(summary) => summary,
        Err(e) => {
            spinner.stop_error("Generator bootstrap failed");
            return Err(e);
        }
    };
    spinner.clear();

    for tool in &summary.built {
        ui::step_ok(&ctx, &format!("Built {}", tool));
    }
    if summary.node_modules_installed {
        ui::step_ok(&ctx, "Installed node_modules");
    }
    if summary.built.is_empty() && !summary.node_modules_installed {
        ui::step_info(&ctx, "All generators already installed");
    }
    ui::key_value(&ctx, "Tools", &deps.tools_dir.display().to_string());
    ui::outro_success(&ctx, "Generators ready");
    Ok(())
}
