//! Generation pipeline
//!
//! One `generate` run moves through these stages in order:
//!
//! 1. Stage the project under `vendor/<module>`
//! 2. Discover proto sources (none found: done, cache untouched)
//! 3. Plan: group by directory and check each package against the cache
//! 4. Compile every stale package in a single compiler run
//! 5. Post-process and record generated files per stale package
//! 6. Sweep orphaned packages and persist the cache
//! 7. Format generated files
//!
//! The cache is only written after stage 5 succeeds, so a failed or
//! cancelled run leaves the previous manifest in place.

pub mod compiler;
pub mod format;
pub mod staging;
pub mod versions;

pub use compiler::{CompileRequest, Compiler, WasmCompiler};
pub use staging::StagingLink;

use crate::cache::{hash_strings, Cache};
use crate::config::{resolve_project_dir, CleanConfig, GenerateConfig};
use crate::discovery::{discover_source_files, find_generated_files, package_key, proto_dir, read_module_path};
use crate::error::{ProtogenError, ProtogenResult};
use crate::plugin::{PluginDiscovery, PluginRegistry};
use crate::postprocess::PostProcessor;
use crate::sandbox::staging_mounts;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Include root for the well-known protobuf sources, relative to `vendor/`
const PROTOBUF_SRC: &str = "github.com/aperturerobotics/protobuf/src";

/// What a `generate` run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    /// Proto files discovered
    pub discovered: usize,
    /// Package keys that were regenerated
    pub regenerated: Vec<String>,
    /// Packages that were up to date
    pub skipped: usize,
    /// Files generated for the regenerated packages
    pub generated_files: Vec<String>,
}

impl GenerateSummary {
    /// Whether the compiler ran
    pub fn compiled(&self) -> bool {
        !self.regenerated.is_empty()
    }
}

/// Orchestrates one project's generation
pub struct Generator {
    config: GenerateConfig,
    project_dir: PathBuf,
    module_path: String,
    vendor_dir: PathBuf,
    cache_path: PathBuf,
    cache: Cache,
    plugins: PluginRegistry,
    compiler: Box<dyn Compiler>,
}

impl Generator {
    /// Prepare a generator backed by the sandboxed compiler
    pub async fn new(config: GenerateConfig) -> ProtogenResult<Self> {
        Self::setup(config, None).await
    }

    /// Prepare a generator with a custom compiler
    pub async fn with_compiler(
        config: GenerateConfig,
        compiler: Box<dyn Compiler>,
    ) -> ProtogenResult<Self> {
        Self::setup(config, Some(compiler)).await
    }

    async fn setup(
        config: GenerateConfig,
        compiler: Option<Box<dyn Compiler>>,
    ) -> ProtogenResult<Self> {
        let project_dir = config.resolve_project_dir()?;
        let module_path = read_module_path(&project_dir)?;
        let vendor_dir = project_dir.join("vendor");
        let cache_path = config.cache_file_path(&project_dir);
        let cache = Cache::load(&cache_path).await;

        let plugins = PluginRegistry::discover(&PluginDiscovery {
            project_dir: project_dir.clone(),
            tools_dir: config.tools_dir_path(&project_dir),
            features: config.features.clone(),
            prost_module: Some(config.prost_module_path(&project_dir)),
        });
        for plugin in plugins.plugins() {
            debug!("Using plugin {}", plugin.binary_name);
        }

        let compiler = match compiler {
            Some(compiler) => compiler,
            None => Box::new(WasmCompiler::new(
                config.protoc_module_path(&project_dir),
                staging_mounts(&vendor_dir, &project_dir, &module_path),
                plugins.clone(),
                config.prost_module_path(&project_dir),
            )),
        };

        Ok(Self {
            config,
            project_dir,
            module_path,
            vendor_dir,
            cache_path,
            cache,
            plugins,
            compiler,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Compiler flags for this project, without inputs
    pub fn protoc_flags(&self) -> Vec<String> {
        let vendor = self.vendor_dir.to_string_lossy().into_owned();
        let mut flags = vec!["-I".to_string(), vendor.clone()];

        let protobuf_src = self.vendor_dir.join(PROTOBUF_SRC);
        if protobuf_src.is_dir() {
            flags.push("-I".to_string());
            flags.push(protobuf_src.to_string_lossy().into_owned());
        }

        flags.extend(self.plugins.protoc_args(&vendor));
        flags.extend(self.config.extra_args.iter().cloned());
        flags
    }

    /// Run the pipeline
    pub async fn generate(&mut self, cancel: &CancellationToken) -> ProtogenResult<GenerateSummary> {
        let _link = StagingLink::create(&self.vendor_dir, &self.module_path, &self.project_dir)?;
        check_cancelled(cancel)?;

        let files =
            discover_source_files(&self.project_dir, &self.config.targets, &self.config.exclude)
                .await?;
        if files.is_empty() {
            info!("No proto files found");
            return Ok(GenerateSummary::default());
        }
        info!("Found {} proto files", files.len());
        check_cancelled(cancel)?;

        let mut summary = GenerateSummary {
            discovered: files.len(),
            ..Default::default()
        };

        // Plan
        let tools_dir = self.config.tools_dir_path(&self.project_dir);
        let tool_versions = versions::tool_versions(
            &self.config.protoc_module_path(&self.project_dir),
            &tools_dir,
            &self.project_dir,
        );
        let force = self.config.force || self.cache.tool_versions != tool_versions;
        if force && !self.config.force {
            info!("Generator versions changed, regenerating everything");
        }

        let flags = self.protoc_flags();
        let flags_hash = hash_strings(&flags);

        let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for file in &files {
            groups.entry(proto_dir(file)).or_default().push(file.clone());
        }

        let mut current_keys = HashSet::new();
        let mut stale: Vec<(String, Vec<String>)> = Vec::new();
        for group in groups.into_values() {
            let key = package_key(&self.module_path, &group[0]);
            current_keys.insert(key.clone());

            if self
                .cache
                .needs_regeneration(&key, &group, &self.project_dir, &flags_hash, force)
            {
                debug!("Will generate {}", key);
                stale.push((key, group));
            } else {
                debug!("Skipping {} (up to date)", key);
                summary.skipped += 1;
            }
        }

        // Execute
        if !stale.is_empty() {
            let proto_files: Vec<String> = stale.iter().flat_map(|(_, g)| g.iter().cloned()).collect();
            let staged = self.vendor_dir.join(&self.module_path);
            let request = CompileRequest {
                args: flags,
                inputs: proto_files
                    .iter()
                    .map(|f| staged.join(f).to_string_lossy().into_owned())
                    .collect(),
                proto_files,
            };
            self.compiler.compile(&request, cancel).await?;
            check_cancelled(cancel)?;

            let post = PostProcessor::new(&self.project_dir, &self.module_path)?;
            for (key, group) in &stale {
                let mut generated = Vec::new();
                for file in group {
                    post.process(file).await?;
                    generated.extend(find_generated_files(
                        &self.project_dir,
                        &self.module_path,
                        file,
                    )?);
                }
                debug!("{}: {} generated files", key, generated.len());
                summary.generated_files.extend(generated.iter().cloned());
                self.cache
                    .update_package(key, group, generated, &self.project_dir)?;
                summary.regenerated.push(key.clone());
            }
            check_cancelled(cancel)?;
        }

        // Reconcile
        self.cache.set_flags_hash(flags_hash);
        self.cache.set_tool_versions(tool_versions);
        self.cache.clean_orphans(&current_keys);
        self.cache.save(&self.cache_path).await?;

        if !summary.generated_files.is_empty() {
            format::format_generated(&self.project_dir, &tools_dir, &summary.generated_files)
                .await?;
        }

        info!(
            "Generated {} packages, {} up to date",
            summary.regenerated.len(),
            summary.skipped
        );
        Ok(summary)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> ProtogenResult<()> {
    if cancel.is_cancelled() {
        return Err(ProtogenError::Cancelled);
    }
    Ok(())
}

/// What `clean` removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub cache_removed: bool,
    pub files_removed: usize,
    pub files_missing: usize,
}

/// Remove the cache and every file it records as generated.
///
/// Removal failures are ignored.
pub async fn clean(config: &CleanConfig) -> ProtogenResult<CleanSummary> {
    let project_dir = resolve_project_dir(config.project_dir.as_deref())?;
    let cache_path = project_dir.join(&config.cache_file);
    let cache = Cache::load(&cache_path).await;

    let mut summary = CleanSummary {
        cache_removed: tokio::fs::remove_file(&cache_path).await.is_ok(),
        ..Default::default()
    };

    for file in cache.packages.values().flat_map(|p| &p.generated_files) {
        match tokio::fs::remove_file(project_dir.join(file)).await {
            Ok(()) => {
                debug!("Removed {}", file);
                summary.files_removed += 1;
            }
            Err(e) => {
                debug!("Could not remove {}: {}", file, e);
                summary.files_missing += 1;
            }
        }
    }

    Ok(summary)
}
