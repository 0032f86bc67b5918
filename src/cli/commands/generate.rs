//! Generate command - compile stale proto packages

use super::load_project_config;
use crate::cli::GenerateArgs;
use crate::config::{resolve_project_dir, GenerateConfig};
use crate::error::ProtogenResult;
use crate::generator::{GenerateSummary, Generator};
use crate::tools::{ensure_deps, DepsConfig};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Execute the generate command
pub async fn execute(args: GenerateArgs, project_dir: Option<PathBuf>) -> ProtogenResult<()> {
    let ctx = UiContext::detect();
    let project_dir = resolve_project_dir(project_dir.as_deref())?;
    let no_deps = args.no_deps;
    let config = apply_args(load_project_config(&project_dir).await?, args);

    if !no_deps {
        let deps = DepsConfig {
            project_dir: project_dir.clone(),
            tools_dir: config.tools_dir_path(&project_dir),
            protoc_module: config.protoc_module_path(&project_dir),
            force: false,
        };
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Checking generators...");
        match ensure_deps(&deps).await {
            Ok(summary) if summary.built.is_empty() && !summary.node_modules_installed => {
                spinner.clear()
            }
            Ok(summary) => spinner.stop(&format!("Built {} tool(s)", summary.built.len())),
            Err(e) => {
                spinner.stop_error("Generator bootstrap failed");
                return Err(e);
            }
        }
    }

    let cancel = CancellationToken::new();
    let interrupt = watch_ctrl_c(cancel.clone());

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Generating...");
    let result = run(config, &cancel).await;
    interrupt.abort();

    match result {
        Ok(summary) => {
            spinner.clear();
            report(&ctx, &project_dir, &summary);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Generation failed");
            Err(e)
        }
    }
}

async fn run(config: GenerateConfig, cancel: &CancellationToken) -> ProtogenResult<GenerateSummary> {
    let mut generator = Generator::new(config).await?;
    generator.generate(cancel).await
}

/// Overlay CLI flags on the loaded config
fn apply_args(mut config: GenerateConfig, args: GenerateArgs) -> GenerateConfig {
    if !args.targets.is_empty() {
        config.targets = args.targets;
    }
    if !args.exclude.is_empty() {
        config.exclude = args.exclude;
    }
    if let Some(cache_file) = args.cache_file {
        config.cache_file = cache_file;
    }
    if let Some(features) = args.features {
        config.features = features;
    }
    if let Some(tools_dir) = args.tools_dir {
        config.tools_dir = tools_dir;
    }
    if !args.extra_args.is_empty() {
        config.extra_args = args.extra_args;
    }
    config.force |= args.force;
    config
}

/// Cancel the token on the first Ctrl-C
fn watch_ctrl_c(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling");
            cancel.cancel();
        }
    })
}

fn report(ctx: &UiContext, project_dir: &Path, summary: &GenerateSummary) {
    if summary.discovered == 0 {
        ui::outro_warn(ctx, &format!("No proto files found in {}", project_dir.display()));
        return;
    }
    if !summary.compiled() {
        ui::outro_success(
            ctx,
            &format!("All {} package(s) up to date", summary.skipped),
        );
        return;
    }

    for package in &summary.regenerated {
        ui::step_ok(ctx, package);
    }
    ui::key_value(ctx, "Proto files", &summary.discovered.to_string());
    ui::key_value(ctx, "Generated files", &summary.generated_files.len().to_string());
    ui::key_value(ctx, "Up to date", &summary.skipped.to_string());
    ui::outro_success(
        ctx,
        &format!("Regenerated {} package(s)", summary.regenerated.len()),
    );
}
