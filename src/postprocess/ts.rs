//! TypeScript import fixups
//!
//! The generator writes cross-module imports as `../` chains relative to
//! the module-relative source path. Imports that leave the project are
//! rewritten to the `@go/` alias, which maps onto the staging directory.

use crate::postprocess::paths::{classify_import, resolve_relative_import, ImportTarget};
use regex::{Captures, Regex};
use std::path::Path;

/// Import alias rooted at the staging directory
pub const GO_ALIAS: &str = "@go/";

/// Compiled patterns for TypeScript rewriting
pub struct TsPatterns {
    source: Regex,
    imports: Regex,
}

impl TsPatterns {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            source: Regex::new(r"@generated from file (\S+\.proto)")?,
            imports: Regex::new(r#"(from\s+|import\s+)(['"])(\.\./[^'"]+)(['"])"#)?,
        })
    }
}

/// Module-relative source proto named in the generated header
pub fn source_path<'a>(content: &'a str, patterns: &TsPatterns) -> Option<&'a str> {
    patterns
        .source
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Decide the replacement specifier for one import, if any
pub fn rewrite_specifier(
    source_dir: &str,
    specifier: &str,
    module_path: &str,
    vendor_dir: &Path,
) -> Option<String> {
    let resolved = resolve_relative_import(source_dir, specifier)?;
    match classify_import(&resolved, module_path) {
        ImportTarget::External(path) => {
            staged_target_exists(vendor_dir, &path).then(|| format!("{}{}", GO_ALIAS, path))
        }
        // No existence check for vendored paths
        ImportTarget::Vendored(suffix) => Some(format!("{}{}", GO_ALIAS, suffix)),
        ImportTarget::Local => None,
    }
}

fn staged_target_exists(vendor_dir: &Path, path: &str) -> bool {
    if vendor_dir.join(path).exists() {
        return true;
    }
    match path.strip_suffix(".js") {
        Some(stem) => vendor_dir.join(format!("{}.ts", stem)).exists(),
        None => false,
    }
}

/// Rewrite one TypeScript file's content
pub fn rewrite(content: &str, module_path: &str, vendor_dir: &Path, patterns: &TsPatterns) -> String {
    let Some(source) = source_path(content, patterns) else {
        return content.to_string();
    };
    let source_dir = source.rsplit_once('/').map_or("", |(dir, _)| dir);

    patterns
        .imports
        .replace_all(content, |caps: &Captures| {
            match rewrite_specifier(source_dir, &caps[3], module_path, vendor_dir) {
                Some(target) => format!("{}{}{}{}", &caps[1], &caps[2], target, &caps[4]),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MODULE: &str = "github.com/acme/widgets";

    fn header() -> &'static str {
        "// @generated from file github.com/acme/widgets/pkg/echo.proto (package echo, syntax proto3)\n"
    }

    #[test]
    fn source_path_from_header() {
        let patterns = TsPatterns::new().unwrap();
        assert_eq!(
            source_path(header(), &patterns),
            Some("github.com/acme/widgets/pkg/echo.proto")
        );
        assert_eq!(source_path("// nothing here", &patterns), None);
    }

    #[test]
    fn external_import_rewritten_when_staged() {
        let vendor = TempDir::new().unwrap();
        let staged = vendor.path().join("github.com/acme/gadgets");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("g.pb.ts"), "").unwrap();

        let patterns = TsPatterns::new().unwrap();
        let input = format!(
            "{}import {{ G }} from \"../../gadgets/g.pb.js\";\nimport \"../../missing/m.pb.js\";\n",
            header()
        );
        let out = rewrite(&input, MODULE, vendor.path(), &patterns);

        assert!(out.contains("from \"@go/github.com/acme/gadgets/g.pb.js\";"));
        assert!(out.contains("import \"../../missing/m.pb.js\";"));
        assert_eq!(rewrite(&out, MODULE, vendor.path(), &patterns), out);
    }

    #[test]
    fn vendored_import_uses_alias_suffix() {
        let vendor = TempDir::new().unwrap();
        let patterns = TsPatterns::new().unwrap();
        let input = format!(
            "{}import {{ R }} from '../vendor/github.com/aperturerobotics/starpc/srpc/rpc.pb.js';\n",
            header()
        );
        let out = rewrite(&input, MODULE, vendor.path(), &patterns);
        assert!(out.contains("from '@go/github.com/aperturerobotics/starpc/srpc/rpc.pb.js';"));
    }

    #[test]
    fn vendored_import_rewritten_when_target_missing() {
        let vendor = TempDir::new().unwrap();
        let patterns = TsPatterns::new().unwrap();
        let input = format!(
            "{}import {{ M }} from \"../vendor/example.com/absent/m.pb.js\";\n",
            header()
        );
        let out = rewrite(&input, MODULE, vendor.path(), &patterns);

        assert!(!vendor.path().join("example.com/absent").exists());
        assert!(out.contains("from \"@go/example.com/absent/m.pb.js\";"));
        assert_eq!(rewrite(&out, MODULE, vendor.path(), &patterns), out);
    }

    #[test]
    fn local_import_untouched() {
        let vendor = TempDir::new().unwrap();
        let patterns = TsPatterns::new().unwrap();
        let input = format!("{}import {{ T }} from \"../types/t.pb.js\";\n", header());
        assert_eq!(rewrite(&input, MODULE, vendor.path(), &patterns), input);
    }

    #[test]
    fn without_header_nothing_changes() {
        let vendor = TempDir::new().unwrap();
        let patterns = TsPatterns::new().unwrap();
        let input = "import { X } from \"../../../x.pb.js\";\n";
        assert_eq!(rewrite(input, MODULE, vendor.path(), &patterns), input);
    }
}
