//! Pure path helpers for import and include rewriting
//!
//! All paths here are `/`-separated and module-relative or
//! project-relative strings, never host paths.

use std::path::{Path, PathBuf};

/// Path from directory `from_dir` to file `to_file`.
///
/// Both are relative to the same root; `""` is the root itself.
pub fn relative_path(from_dir: &str, to_file: &str) -> String {
    let from: Vec<&str> = split(from_dir);
    let to: Vec<&str> = split(to_file);
    let to_dir = &to[..to.len().saturating_sub(1)];

    let common = from
        .iter()
        .zip(to_dir.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    parts.join("/")
}

/// Resolve a `../`-style specifier against `base_dir`.
///
/// Returns `None` when the specifier climbs above the root.
pub fn resolve_relative_import(base_dir: &str, specifier: &str) -> Option<String> {
    let mut parts: Vec<&str> = split(base_dir);
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Where a resolved import points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Another module; carries the module-relative path
    External(String),
    /// A dependency vendored inside this module; carries the part after `vendor/`
    Vendored(String),
    /// A file of this module
    Local,
}

/// Classify a resolved module-relative import against `module_path`
pub fn classify_import(resolved: &str, module_path: &str) -> ImportTarget {
    let Some(rest) = resolved
        .strip_prefix(module_path)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return ImportTarget::External(resolved.to_string());
    };

    match rest.strip_prefix("vendor/") {
        Some(suffix) if !suffix.is_empty() => ImportTarget::Vendored(suffix.to_string()),
        _ => ImportTarget::Local,
    }
}

/// Whether the first line of a file declares a build condition
pub fn has_build_condition(content: &str) -> bool {
    content
        .lines()
        .next()
        .is_some_and(|line| line.starts_with("//go:build"))
}

/// Where the prost generator writes the output for `base_name`.
///
/// The location follows the proto package, not the source directory.
pub fn prost_output_path(vendor_dir: &Path, package: Option<&str>, base_name: &str) -> PathBuf {
    let mut path = vendor_dir.to_path_buf();
    if let Some(package) = package {
        path.extend(package.split('.').filter(|p| !p.is_empty()));
    }
    path.join(format!("{}.pb.rs", base_name))
}

fn split(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect()
}
