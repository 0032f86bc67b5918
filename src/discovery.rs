//! Proto source discovery and project identity
//!
//! Sources come from `git ls-files` when the project is a git checkout and
//! from filesystem globbing otherwise. The Go module path from `go.mod`
//! namespaces package keys and the staging layout.

use crate::error::{ProtogenError, ProtogenResult};
use glob::Pattern;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Find proto files matching `patterns`, minus anything matching `exclude`.
///
/// Results are project-relative, deduplicated, in first-seen order.
pub async fn discover_source_files(
    project_dir: &Path,
    patterns: &[String],
    exclude: &[String],
) -> ProtogenResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        for file in discover_pattern(project_dir, pattern).await? {
            if matches_any_pattern(&file, exclude) {
                debug!("Excluding {}", file);
                continue;
            }
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    Ok(files)
}

/// Check a relative path, or its file name, against glob patterns
pub fn matches_any_pattern(file: &str, patterns: &[String]) -> bool {
    let name = file.rsplit('/').next().unwrap_or(file);
    patterns.iter().any(|raw| match Pattern::new(raw) {
        Ok(pattern) => pattern.matches(file) || pattern.matches(name),
        Err(_) => false,
    })
}

async fn discover_pattern(project_dir: &Path, pattern: &str) -> ProtogenResult<Vec<String>> {
    match git_ls_files(project_dir, pattern).await {
        Some(files) => Ok(files),
        None => glob_pattern(project_dir, pattern),
    }
}

/// List tracked files via git; `None` when git is unusable here
async fn git_ls_files(project_dir: &Path, pattern: &str) -> Option<Vec<String>> {
    let output = Command::new("git")
        .args(["ls-files", pattern])
        .current_dir(project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match output {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            debug!(
                "git ls-files failed, falling back to glob: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        Err(e) => {
            debug!("git unavailable, falling back to glob: {}", e);
            return None;
        }
    };

    let files = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.ends_with(".proto"))
        .map(str::to_string)
        .collect();
    Some(files)
}

fn glob_pattern(project_dir: &Path, pattern: &str) -> ProtogenResult<Vec<String>> {
    let pattern = pattern.trim_start_matches("./");
    let base = Pattern::escape(&project_dir.to_string_lossy());
    let full = format!("{}/{}", base.trim_end_matches('/'), pattern);

    let paths = glob::glob(&full).map_err(|e| ProtogenError::PathInvalid {
        path: PathBuf::from(pattern),
        reason: e.to_string(),
    })?;

    let project_real = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf());
    let mut files = Vec::new();
    for entry in paths {
        let Ok(path) = entry else { continue };
        if !path.is_file() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(project_dir) else {
            continue;
        };
        // Skip copies reached through the staging link or other symlinked dirs
        if !is_real_path(&project_real, rel) {
            continue;
        }
        let rel = to_slash(rel);
        if rel.ends_with(".proto") {
            files.push(rel);
        }
    }
    Ok(files)
}

fn is_real_path(project_real: &Path, rel: &Path) -> bool {
    let Some(parent) = rel.parent() else {
        return true;
    };
    match project_real.join(parent).canonicalize() {
        Ok(real) => real.strip_prefix(project_real).ok() == Some(parent),
        Err(_) => false,
    }
}

/// Read the module path declared in `go.mod`
pub fn read_module_path(project_dir: &Path) -> ProtogenResult<String> {
    let go_mod = project_dir.join("go.mod");
    let content = match std::fs::read_to_string(&go_mod) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProtogenError::ManifestMissing(go_mod));
        }
        Err(e) => return Err(ProtogenError::io(format!("reading {}", go_mod.display()), e)),
    };

    parse_module_directive(&content).ok_or(ProtogenError::ModulePathMissing(go_mod))
}

fn parse_module_directive(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or("").trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let module = rest.trim().trim_matches('"').trim_matches('`');
        (!module.is_empty()).then(|| module.to_string())
    })
}

/// Cache key for the package containing `proto_file`
pub fn package_key(module_path: &str, proto_file: &str) -> String {
    match proto_dir(proto_file) {
        "" => module_path.to_string(),
        dir => format!("{}/{}", module_path, dir),
    }
}

/// Directory part of a project-relative path, `""` for the project root
pub fn proto_dir(proto_file: &str) -> &str {
    let file = proto_file.trim_start_matches("./");
    match file.rfind('/') {
        Some(idx) => &file[..idx],
        None => "",
    }
}

/// File name of a proto without the `.proto` suffix
pub fn proto_base_name(proto_file: &str) -> &str {
    let name = proto_file.rsplit('/').next().unwrap_or(proto_file);
    name.strip_suffix(".proto").unwrap_or(name)
}

/// Find files generated for `proto_file`.
///
/// Looks in the source directory and under `vendor/<module>`, skipping
/// vendor matches that are the same physical file as a local one.
pub fn find_generated_files(
    project_dir: &Path,
    module_path: &str,
    proto_file: &str,
) -> ProtogenResult<Vec<String>> {
    let dir = proto_dir(proto_file);
    let file_glob = format!("{}*.pb.*", Pattern::escape(proto_base_name(proto_file)));

    let local_dir = project_dir.join(dir);
    let vendor_dir = project_dir.join("vendor").join(module_path).join(dir);

    let local = glob_files(&local_dir, &file_glob)?;
    let local_real: HashSet<PathBuf> = local.iter().filter_map(|p| p.canonicalize().ok()).collect();

    let mut files: Vec<String> = local
        .iter()
        .filter_map(|p| p.strip_prefix(project_dir).ok().map(to_slash))
        .collect();

    for path in glob_files(&vendor_dir, &file_glob)? {
        if let Ok(real) = path.canonicalize() {
            if local_real.contains(&real) {
                continue;
            }
        }
        if let Ok(rel) = path.strip_prefix(project_dir) {
            files.push(to_slash(rel));
        }
    }

    Ok(files)
}

fn glob_files(dir: &Path, file_glob: &str) -> ProtogenResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let full = format!("{}/{}", Pattern::escape(&dir.to_string_lossy()), file_glob);
    let paths = glob::glob(&full).map_err(|e| ProtogenError::PathInvalid {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(paths.filter_map(Result::ok).filter(|p| p.is_file()).collect())
}

/// Render a relative path with `/` separators
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
