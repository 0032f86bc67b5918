//! Code generator plugin discovery
//!
//! Each ecosystem is gated on its manifest: Go-side generators need
//! `go.mod`, TypeScript generators need `package.json`. A missing manifest
//! or executable leaves the slot empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Language ecosystem a plugin generates for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Cpp,
    Go,
    TypeScript,
    Rust,
}

/// Known plugin kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    GoLite,
    GoStarpc,
    EsLite,
    EsStarpc,
    CppStarpc,
    RustProst,
    RustStarpc,
}

impl PluginKind {
    /// Order in which plugin flags are emitted
    pub const ALL: [PluginKind; 7] = [
        PluginKind::GoLite,
        PluginKind::GoStarpc,
        PluginKind::EsLite,
        PluginKind::EsStarpc,
        PluginKind::CppStarpc,
        PluginKind::RustProst,
        PluginKind::RustStarpc,
    ];

    /// Name used in `--<name>_out` / `--<name>_opt`
    pub fn name(&self) -> &'static str {
        match self {
            Self::GoLite => "go-lite",
            Self::GoStarpc => "go-starpc",
            Self::EsLite => "es-lite",
            Self::EsStarpc => "es-starpc",
            Self::CppStarpc => "starpc-cpp",
            Self::RustProst => "prost",
            Self::RustStarpc => "starpc-rust",
        }
    }

    /// Executable name, also the program name the compiler asks for
    pub fn binary_name(&self) -> String {
        format!("protoc-gen-{}", self.name())
    }

    pub fn target(&self) -> Target {
        match self {
            Self::GoLite | Self::GoStarpc => Target::Go,
            Self::EsLite | Self::EsStarpc => Target::TypeScript,
            Self::CppStarpc => Target::Cpp,
            Self::RustProst | Self::RustStarpc => Target::Rust,
        }
    }
}

/// A discovered code generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub kind: PluginKind,
    pub name: String,
    pub binary_name: String,
    /// Native executable; `None` when only the embedded module serves it
    pub path: Option<PathBuf>,
    pub target: Target,
    pub out_flag: String,
    pub options: BTreeMap<String, String>,
}

impl Plugin {
    fn new(kind: PluginKind, path: Option<PathBuf>) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            binary_name: kind.binary_name(),
            path,
            target: kind.target(),
            out_flag: format!("--{}_out", kind.name()),
            options: BTreeMap::new(),
        }
    }

    fn with_option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    /// Flags for this plugin writing to `out_dir`
    pub fn args(&self, out_dir: &str) -> Vec<String> {
        let mut args = vec![format!("{}={}", self.out_flag, out_dir)];
        for (key, value) in &self.options {
            args.push(format!("--{}_opt={}={}", self.name, key, value));
        }
        args
    }
}

/// Inputs for plugin discovery
#[derive(Debug, Clone)]
pub struct PluginDiscovery {
    pub project_dir: PathBuf,
    pub tools_dir: PathBuf,
    /// go-lite feature selector
    pub features: String,
    /// Embedded prost module, if one is configured
    pub prost_module: Option<PathBuf>,
}

/// Plugins available for this run, one slot per kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRegistry {
    pub go_lite: Option<Plugin>,
    pub go_starpc: Option<Plugin>,
    pub es_lite: Option<Plugin>,
    pub es_starpc: Option<Plugin>,
    pub cpp_starpc: Option<Plugin>,
    pub rust_prost: Option<Plugin>,
    pub rust_starpc: Option<Plugin>,
}

impl PluginRegistry {
    /// Probe the project and tools directory for generators
    pub fn discover(discovery: &PluginDiscovery) -> Self {
        let mut registry = Self::default();
        let bin_dir = discovery.tools_dir.join("bin");

        if discovery.project_dir.join("go.mod").is_file() {
            registry.go_lite = probe(&bin_dir, PluginKind::GoLite)
                .map(|p| p.with_option("features", &discovery.features));
            registry.go_starpc = probe(&bin_dir, PluginKind::GoStarpc);
            registry.cpp_starpc = probe(&bin_dir, PluginKind::CppStarpc);
            registry.rust_starpc = probe(&bin_dir, PluginKind::RustStarpc);
            registry.rust_prost = discover_prost(&bin_dir, discovery.prost_module.as_deref());
        } else {
            debug!("No go.mod, skipping Go, C++ and Rust generators");
        }

        if discovery.project_dir.join("package.json").is_file() {
            let node_bin = discovery.project_dir.join("node_modules").join(".bin");
            registry.es_lite = probe(&node_bin, PluginKind::EsLite).map(es_options);
            registry.es_starpc = probe(&node_bin, PluginKind::EsStarpc).map(es_options);
        } else {
            debug!("No package.json, skipping TypeScript generators");
        }

        registry
    }

    /// Get the plugin in a slot
    pub fn get(&self, kind: PluginKind) -> Option<&Plugin> {
        match kind {
            PluginKind::GoLite => self.go_lite.as_ref(),
            PluginKind::GoStarpc => self.go_starpc.as_ref(),
            PluginKind::EsLite => self.es_lite.as_ref(),
            PluginKind::EsStarpc => self.es_starpc.as_ref(),
            PluginKind::CppStarpc => self.cpp_starpc.as_ref(),
            PluginKind::RustProst => self.rust_prost.as_ref(),
            PluginKind::RustStarpc => self.rust_starpc.as_ref(),
        }
    }

    /// Populated slots in flag order
    pub fn plugins(&self) -> impl Iterator<Item = &Plugin> {
        PluginKind::ALL.into_iter().filter_map(|kind| self.get(kind))
    }

    /// Compiler flags for all populated slots
    pub fn protoc_args(&self, out_dir: &str) -> Vec<String> {
        let mut args = vec![format!("--cpp_out={}", out_dir)];
        for plugin in self.plugins() {
            args.extend(plugin.args(out_dir));
        }
        args
    }
}

fn es_options(plugin: Plugin) -> Plugin {
    plugin
        .with_option("target", "ts")
        .with_option("ts_nocheck", "false")
}

fn probe(dir: &Path, kind: PluginKind) -> Option<Plugin> {
    let path = dir.join(kind.binary_name());
    if path.is_file() {
        debug!("Found {} at {}", kind.binary_name(), path.display());
        Some(Plugin::new(kind, Some(path)))
    } else {
        debug!("{} not found in {}", kind.binary_name(), dir.display());
        None
    }
}

fn discover_prost(bin_dir: &Path, embedded: Option<&Path>) -> Option<Plugin> {
    let native = probe(bin_dir, PluginKind::RustProst)
        .and_then(|p| p.path)
        .or_else(|| which::which(PluginKind::RustProst.binary_name()).ok());
    let has_embedded = embedded.is_some_and(Path::is_file);

    if native.is_none() && !has_embedded {
        debug!("No prost generator available");
        return None;
    }
    Some(Plugin::new(PluginKind::RustProst, native))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PluginDiscovery) {
        let dir = TempDir::new().unwrap();
        let discovery = PluginDiscovery {
            project_dir: dir.path().to_path_buf(),
            tools_dir: dir.path().join(".tools"),
            features: "marshal+size".to_string(),
            prost_module: None,
        };
        (dir, discovery)
    }

    fn install(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), "#!/bin/sh\n").unwrap();
    }

    #[test]
    fn empty_project_has_only_cpp() {
        let (_dir, discovery) = setup();
        let registry = PluginRegistry::discover(&discovery);
        assert_eq!(registry.plugins().count(), 0);
        assert_eq!(registry.protoc_args("vendor"), vec!["--cpp_out=vendor"]);
    }

    #[test]
    fn go_plugins_need_go_mod() {
        let (dir, discovery) = setup();
        install(&discovery.tools_dir.join("bin"), "protoc-gen-go-lite");

        assert!(PluginRegistry::discover(&discovery).go_lite.is_none());

        fs::write(dir.path().join("go.mod"), "module example.com/m\n").unwrap();
        let registry = PluginRegistry::discover(&discovery);
        let go_lite = registry.go_lite.unwrap();
        assert_eq!(go_lite.target, Target::Go);
        assert_eq!(go_lite.options.get("features").unwrap(), "marshal+size");
    }

    #[test]
    fn es_plugins_found_in_node_modules() {
        let (dir, discovery) = setup();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        install(&dir.path().join("node_modules/.bin"), "protoc-gen-es-lite");

        let registry = PluginRegistry::discover(&discovery);
        let es_lite = registry.es_lite.as_ref().unwrap();
        assert_eq!(es_lite.target, Target::TypeScript);
        assert!(registry.es_starpc.is_none());
        assert_eq!(
            es_lite.args("vendor"),
            vec![
                "--es-lite_out=vendor",
                "--es-lite_opt=target=ts",
                "--es-lite_opt=ts_nocheck=false",
            ]
        );
    }

    #[test]
    fn prost_registered_from_embedded_module() {
        let (dir, mut discovery) = setup();
        fs::write(dir.path().join("go.mod"), "module example.com/m\n").unwrap();
        let module = dir.path().join("prost.wasm");

        discovery.prost_module = Some(module.clone());
        assert!(PluginRegistry::discover(&discovery)
            .rust_prost
            .as_ref()
            .is_none_or(|p| p.path.is_some()));

        fs::write(&module, b"\0asm").unwrap();
        let registry = PluginRegistry::discover(&discovery);
        let prost = registry.rust_prost.unwrap();
        assert_eq!(prost.target, Target::Rust);
        assert_eq!(prost.binary_name, "protoc-gen-prost");
    }

    #[test]
    fn protoc_args_follow_slot_order() {
        let (dir, discovery) = setup();
        fs::write(dir.path().join("go.mod"), "module example.com/m\n").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let bin = discovery.tools_dir.join("bin");
        install(&bin, "protoc-gen-starpc-cpp");
        install(&bin, "protoc-gen-go-starpc");
        install(&bin, "protoc-gen-go-lite");
        install(&dir.path().join("node_modules/.bin"), "protoc-gen-es-starpc");

        let args = PluginRegistry::discover(&discovery).protoc_args("out");
        let outs: Vec<&str> = args
            .iter()
            .filter(|a| a.contains("_out="))
            .map(String::as_str)
            .collect();
        assert_eq!(
            outs,
            vec![
                "--cpp_out=out",
                "--go-lite_out=out",
                "--go-starpc_out=out",
                "--es-starpc_out=out",
                "--starpc-cpp_out=out",
            ]
        );
    }

    #[test]
    fn options_are_sorted() {
        let plugin = Plugin::new(PluginKind::EsLite, None)
            .with_option("ts_nocheck", "false")
            .with_option("target", "ts");
        assert_eq!(
            plugin.args("o")[1..],
            ["--es-lite_opt=target=ts", "--es-lite_opt=ts_nocheck=false"]
        );
    }
}
