//! Generator toolchain bootstrap
//!
//! Builds the Go-side plugins and formatter into `<tools>/bin` from the
//! tools module, and installs node dependencies for TypeScript generators.

use crate::error::{ProtogenError, ProtogenResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Tools built from the tools module: (binary name, Go import path)
pub const GO_TOOLS: [(&str, &str); 4] = [
    (
        "protoc-gen-go-lite",
        "github.com/aperturerobotics/protobuf-go-lite/cmd/protoc-gen-go-lite",
    ),
    (
        "protoc-gen-go-starpc",
        "github.com/aperturerobotics/starpc/cmd/protoc-gen-go-starpc",
    ),
    (
        "protoc-gen-starpc-cpp",
        "github.com/aperturerobotics/starpc/cmd/protoc-gen-starpc-cpp",
    ),
    ("gofumpt", "mvdan.cc/gofumpt"),
];

/// Inputs for [`ensure_deps`]
#[derive(Debug, Clone)]
pub struct DepsConfig {
    pub project_dir: PathBuf,
    pub tools_dir: PathBuf,
    /// Compiler module that must be present afterwards
    pub protoc_module: PathBuf,
    /// Rebuild tools that already exist
    pub force: bool,
}

/// What [`ensure_deps`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepsSummary {
    pub built: Vec<String>,
    pub node_modules_installed: bool,
}

/// Make sure every generator the project needs is installed
pub async fn ensure_deps(config: &DepsConfig) -> ProtogenResult<DepsSummary> {
    if !config.tools_dir.is_dir() {
        return Err(ProtogenError::ToolsDirMissing(config.tools_dir.clone()));
    }

    let mut summary = DepsSummary::default();

    if config.project_dir.join("go.mod").is_file() {
        for (tool, import_path) in missing_tools(&config.tools_dir, config.force) {
            build_go_tool(&config.tools_dir, tool, import_path).await?;
            summary.built.push(tool.to_string());
        }
    }

    if config.project_dir.join("package.json").is_file()
        && !config.project_dir.join("node_modules").exists()
    {
        install_node_modules(&config.project_dir).await?;
        summary.node_modules_installed = true;
    }

    if !config.protoc_module.is_file() {
        return Err(ProtogenError::CompilerModuleMissing(
            config.protoc_module.clone(),
        ));
    }

    Ok(summary)
}

/// Tools that need building, in build order
pub fn missing_tools(tools_dir: &Path, force: bool) -> Vec<(&'static str, &'static str)> {
    let bin = tools_dir.join("bin");
    GO_TOOLS
        .into_iter()
        .filter(|(tool, _)| force || !bin.join(tool).is_file())
        .collect()
}

async fn build_go_tool(tools_dir: &Path, tool: &str, import_path: &str) -> ProtogenResult<()> {
    info!("Building {}", tool);
    let output_path = format!("bin/{}", tool);
    let output = Command::new("go")
        .args(["build", "-mod=readonly", "-o", &output_path, import_path])
        .current_dir(tools_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProtogenError::command_failed(format!("go build {}", import_path), e))?;

    if !output.status.success() {
        return Err(ProtogenError::ToolBuild {
            tool: tool.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    debug!("Built {}", tools_dir.join(&output_path).display());
    Ok(())
}

async fn install_node_modules(project_dir: &Path) -> ProtogenResult<()> {
    info!("Installing node_modules");
    let output = Command::new("yarn")
        .arg("install")
        .current_dir(project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProtogenError::command_failed("yarn install", e))?;

    if !output.status.success() {
        return Err(ProtogenError::ToolBuild {
            tool: "node_modules".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
