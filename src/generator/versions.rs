//! Generator version fingerprint
//!
//! Stored in the cache; a change forces a full regeneration.

use serde_json::Value;
use std::path::Path;

const GO_TOOLS: [(&str, &str); 2] = [
    ("github.com/aperturerobotics/protobuf-go-lite", "protobuf-go-lite"),
    ("github.com/aperturerobotics/starpc", "starpc"),
];

const NPM_TOOLS: [(&str, &str); 2] = [
    ("@aptre/protobuf-es-lite", "protobuf-es-lite"),
    ("starpc", "starpc-es"),
];

/// Comma-separated `name=version` pairs
pub fn tool_versions(compiler_module: &Path, tools_dir: &Path, project_dir: &Path) -> String {
    let mut versions = vec![compiler_fingerprint(compiler_module)];

    if let Ok(go_mod) = std::fs::read_to_string(tools_dir.join("go.mod")) {
        versions.extend(go_mod_versions(&go_mod));
    }
    if let Ok(package_json) = std::fs::read_to_string(project_dir.join("package.json")) {
        versions.extend(package_json_versions(&package_json));
    }

    versions.join(",")
}

fn compiler_fingerprint(module: &Path) -> String {
    let name = module
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match std::fs::metadata(module) {
        Ok(meta) => format!("protoc={}:{}", name, meta.len()),
        Err(_) => "protoc=none".to_string(),
    }
}

/// Versions required by a `go.mod`, ignoring replace directives
pub fn go_mod_versions(content: &str) -> Vec<String> {
    let mut versions = Vec::new();
    for line in content.lines() {
        if line.contains("=>") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        for (module, name) in GO_TOOLS {
            if let Some(idx) = fields.iter().position(|f| *f == module) {
                if let Some(version) = fields.get(idx + 1) {
                    versions.push(format!("{}={}", name, version));
                }
            }
        }
    }
    versions
}

/// Versions declared in `package.json` dependencies
pub fn package_json_versions(content: &str) -> Vec<String> {
    let Ok(manifest) = serde_json::from_str::<Value>(content) else {
        return vec![];
    };

    NPM_TOOLS
        .iter()
        .filter_map(|(package, name)| {
            ["dependencies", "devDependencies"]
                .iter()
                .find_map(|section| manifest.get(section)?.get(package)?.as_str())
                .map(|version| format!("{}={}", name, version))
        })
        .collect()
}
