//! Compiler invocation seam
//!
//! The generator issues one [`CompileRequest`] per run. [`WasmCompiler`]
//! serves it with the sandboxed protoc; other implementations can stand
//! in for it.

use crate::error::{ProtogenError, ProtogenResult};
use crate::plugin::{EmbeddedRuntime, PluginDispatch, PluginKind, PluginRegistry};
use crate::sandbox::{Mount, SandboxedCompiler};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One compiler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Flags, without the program name or inputs
    pub args: Vec<String>,
    /// Input paths as the compiler sees them
    pub inputs: Vec<String>,
    /// The same inputs, project-relative
    pub proto_files: Vec<String>,
}

impl CompileRequest {
    /// Full argument list: flags followed by inputs
    pub fn argv(&self) -> Vec<String> {
        self.args.iter().chain(&self.inputs).cloned().collect()
    }
}

/// Runs the protobuf compiler
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, request: &CompileRequest, cancel: &CancellationToken)
        -> ProtogenResult<()>;
}

/// protoc compiled to WASI, with plugins dispatched on the host
pub struct WasmCompiler {
    module_path: PathBuf,
    mounts: Vec<Mount>,
    plugins: PluginRegistry,
    prost_module: PathBuf,
}

impl WasmCompiler {
    pub fn new(
        module_path: PathBuf,
        mounts: Vec<Mount>,
        plugins: PluginRegistry,
        prost_module: PathBuf,
    ) -> Self {
        Self {
            module_path,
            mounts,
            plugins,
            prost_module,
        }
    }

    /// Embedded prost runtime, when prost is selected and its module exists
    fn embedded_runtime(&self, compiler: &SandboxedCompiler) -> ProtogenResult<Option<EmbeddedRuntime>> {
        if self.plugins.rust_prost.is_none() || !self.prost_module.is_file() {
            return Ok(None);
        }
        let program = PluginKind::RustProst.binary_name();
        EmbeddedRuntime::init(compiler.engine(), &program, &self.prost_module).map(Some)
    }

    /// Dispatch table for one run. The embedded prost module replaces a
    /// native `protoc-gen-prost` when both exist.
    fn dispatch(
        &self,
        compiler: &SandboxedCompiler,
    ) -> ProtogenResult<(PluginDispatch, Option<EmbeddedRuntime>)> {
        let mut dispatch = PluginDispatch::from_registry(&self.plugins);
        let embedded = self.embedded_runtime(compiler)?;
        if let Some(handler) = embedded.as_ref().and_then(EmbeddedRuntime::handler) {
            debug!("Serving {} from the embedded module", PluginKind::RustProst.binary_name());
            dispatch.register(PluginKind::RustProst.binary_name(), Arc::new(handler));
        }
        Ok((dispatch, embedded))
    }
}

#[async_trait]
impl Compiler for WasmCompiler {
    async fn compile(
        &self,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> ProtogenResult<()> {
        let compiler = SandboxedCompiler::new(&self.module_path, self.mounts.clone())?;

        let (dispatch, mut embedded) = self.dispatch(&compiler)?;
        let dispatch = Arc::new(dispatch);

        let argv = request.argv();
        info!("Compiling {} proto files", request.inputs.len());
        debug!("protoc {}", argv.join(" "));

        let watcher = compiler.watch_cancellation(cancel.clone());
        let handle = Handle::current();
        let token = cancel.clone();
        let result = tokio::task::spawn_blocking(move || compiler.run(&argv, dispatch, handle, token))
            .await;
        watcher.abort();
        if let Some(ref mut runtime) = embedded {
            runtime.close();
        }

        let output = result
            .map_err(|e| ProtogenError::Internal(format!("compiler task failed: {}", e)))??;

        if !output.stdout.trim().is_empty() {
            debug!("protoc: {}", output.stdout.trim());
        }
        if !output.success() {
            return Err(ProtogenError::CompilerFailed {
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}
