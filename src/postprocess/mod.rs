//! Post-processing of generated files
//!
//! Runs per source proto after the compiler, in this order:
//!
//! 1. Rust: move prost output from its package-derived path into place
//! 2. C++: build condition and relative includes
//! 3. Go: well-known types from protobuf-go-lite
//! 4. TypeScript: cross-module imports through the `@go/` alias
//!
//! Every rewrite is idempotent and a file is only written when its content
//! changed. Any I/O failure is fatal.

pub mod cpp;
pub mod go;
pub mod paths;
pub mod rust;
pub mod ts;

use crate::discovery::{proto_base_name, proto_dir};
use crate::error::{ProtogenError, ProtogenResult};
use glob::Pattern;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub use paths::{
    classify_import, has_build_condition, prost_output_path, relative_path,
    resolve_relative_import, ImportTarget,
};

/// Rewrites generated files for one project
pub struct PostProcessor {
    project_dir: PathBuf,
    module_path: String,
    vendor_dir: PathBuf,
    includes: Regex,
    package: Regex,
    ts: ts::TsPatterns,
}

impl PostProcessor {
    pub fn new(project_dir: &Path, module_path: &str) -> ProtogenResult<Self> {
        let regex_error = |e: regex::Error| ProtogenError::Internal(e.to_string());
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            module_path: module_path.to_string(),
            vendor_dir: project_dir.join("vendor"),
            includes: cpp::include_pattern(module_path).map_err(regex_error)?,
            package: rust::package_pattern().map_err(regex_error)?,
            ts: ts::TsPatterns::new().map_err(regex_error)?,
        })
    }

    /// Post-process everything generated for `proto_file`
    pub async fn process(&self, proto_file: &str) -> ProtogenResult<()> {
        let dir = proto_dir(proto_file);
        let base = proto_base_name(proto_file);
        let out_dir = self.project_dir.join(dir);

        self.relocate_rust(proto_file, dir, base).await?;

        for file in self.outputs(&out_dir, base, &["pb.cc", "pb.h"])? {
            self.rewrite_file(&file, |content| cpp::rewrite(content, dir, &self.includes))
                .await?;
        }

        for file in self.outputs(&out_dir, base, &["pb.go"])? {
            self.rewrite_file(&file, go::rewrite).await?;
        }

        for file in self.outputs(&out_dir, base, &["pb.ts"])? {
            self.rewrite_file(&file, |content| {
                ts::rewrite(content, &self.module_path, &self.vendor_dir, &self.ts)
            })
            .await?;
        }

        Ok(())
    }

    async fn relocate_rust(&self, proto_file: &str, dir: &str, base: &str) -> ProtogenResult<()> {
        let source = self.project_dir.join(proto_file);
        let content = fs::read_to_string(&source)
            .await
            .map_err(|e| ProtogenError::post_process(&source, e))?;
        let package = rust::proto_package(&content, &self.package);

        let destination = self
            .vendor_dir
            .join(&self.module_path)
            .join(dir)
            .join(format!("{}.pb.rs", base));
        rust::relocate(&self.vendor_dir, package, base, &destination).await?;
        Ok(())
    }

    /// `<dir>/<base>*.<ext>` for each extension
    fn outputs(&self, dir: &Path, base: &str, extensions: &[&str]) -> ProtogenResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for ext in extensions {
            let pattern = format!(
                "{}/{}*.{}",
                Pattern::escape(&dir.to_string_lossy()),
                Pattern::escape(base),
                ext
            );
            let paths = glob::glob(&pattern).map_err(|e| ProtogenError::PathInvalid {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
            files.extend(paths.filter_map(Result::ok).filter(|p| p.is_file()));
        }
        Ok(files)
    }

    async fn rewrite_file<F>(&self, path: &Path, rewrite: F) -> ProtogenResult<()>
    where
        F: FnOnce(&str) -> String,
    {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ProtogenError::post_process(path, e))?;
        let updated = rewrite(&content);
        if updated == content {
            return Ok(());
        }

        debug!("Rewriting {}", path.display());
        fs::write(path, updated)
            .await
            .map_err(|e| ProtogenError::post_process(path, e))
    }
}
