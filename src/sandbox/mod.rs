//! Sandboxed protobuf compiler
//!
//! Runs `protoc` compiled to WASI under wasmtime. The guest only sees the
//! preopened mounts, writes outputs through them, and reaches plugins
//! through the host bridge.

pub mod bridge;

use crate::error::{ProtogenError, ProtogenResult};
use crate::plugin::embedded::is_interrupt;
use crate::plugin::PluginDispatch;
use bridge::SandboxState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wasmtime::{Config, Engine, Linker, Module, Store};
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1;
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit, WasiCtxBuilder};

const OUTPUT_CAPACITY: usize = 16 * 1024 * 1024;

/// A host directory visible to the guest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub guest: String,
}

impl Mount {
    /// Mount a directory at its own absolute path
    pub fn identity(path: &Path) -> Self {
        Self {
            host: path.to_path_buf(),
            guest: path.to_string_lossy().into_owned(),
        }
    }
}

/// Mounts for a staged project.
///
/// The project is mounted a second time under `vendor/<module>` because the
/// guest cannot follow the staging symlink across preopens.
pub fn staging_mounts(vendor_dir: &Path, project_dir: &Path, module_path: &str) -> Vec<Mount> {
    vec![
        Mount::identity(vendor_dir),
        Mount::identity(project_dir),
        Mount {
            host: project_dir.to_path_buf(),
            guest: vendor_dir.join(module_path).to_string_lossy().into_owned(),
        },
    ]
}

/// Result of one compiler run
#[derive(Debug, Clone, Default)]
pub struct CompilerOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CompilerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The compiled compiler module and its mounts
pub struct SandboxedCompiler {
    engine: Engine,
    module: Module,
    mounts: Vec<Mount>,
}

impl SandboxedCompiler {
    /// Compile the compiler module
    pub fn new(module_path: &Path, mounts: Vec<Mount>) -> ProtogenResult<Self> {
        if !module_path.is_file() {
            return Err(ProtogenError::CompilerModuleMissing(module_path.to_path_buf()));
        }

        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).map_err(sandbox_error)?;

        debug!("Compiling {}", module_path.display());
        let module = Module::from_file(&engine, module_path)
            .map_err(|e| ProtogenError::Sandbox(format!("{}: {:#}", module_path.display(), e)))?;

        Ok(Self {
            engine,
            module,
            mounts,
        })
    }

    /// Engine shared with in-process plugins
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Interrupt running stores once `cancel` fires
    pub fn watch_cancellation(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            debug!("Interrupting sandbox");
            engine.increment_epoch();
        })
    }

    /// Run `protoc <args>` to completion.
    ///
    /// Blocks the calling thread; plugin calls are driven on `runtime`.
    pub fn run(
        &self,
        args: &[String],
        dispatch: Arc<PluginDispatch>,
        runtime: Handle,
        cancel: CancellationToken,
    ) -> ProtogenResult<CompilerOutput> {
        let stdout = MemoryOutputPipe::new(OUTPUT_CAPACITY);
        let stderr = MemoryOutputPipe::new(OUTPUT_CAPACITY);

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("protoc".to_string());
        argv.extend(args.iter().cloned());

        let mut builder = WasiCtxBuilder::new();
        builder
            .args(&argv)
            .stdout(stdout.clone())
            .stderr(stderr.clone());
        for mount in &self.mounts {
            builder
                .preopened_dir(&mount.host, &mount.guest, DirPerms::all(), FilePerms::all())
                .map_err(|e| {
                    ProtogenError::Sandbox(format!("mounting {}: {:#}", mount.host.display(), e))
                })?;
        }

        let state = SandboxState::new(builder.build_p1(), dispatch, runtime, cancel.clone());
        let mut store = Store::new(&self.engine, state);
        store.set_epoch_deadline(1);

        let mut linker: Linker<SandboxState> = Linker::new(&self.engine);
        preview1::add_to_linker_sync(&mut linker, bridge::wasi_ctx).map_err(sandbox_error)?;
        bridge::add_to_linker(&mut linker).map_err(sandbox_error)?;

        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(sandbox_error)?;
        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(sandbox_error)?;

        let result = start.call(&mut store, ());

        if let Some(err) = store.data_mut().take_dispatch_error() {
            return Err(err);
        }

        let exit_code = match result {
            Ok(()) => 0,
            Err(e) => match e.downcast_ref::<I32Exit>() {
                Some(exit) => exit.0,
                None if is_interrupt(&e) || cancel.is_cancelled() => {
                    return Err(ProtogenError::Cancelled)
                }
                None => return Err(sandbox_error(e)),
            },
        };

        Ok(CompilerOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout.contents()).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.contents()).into_owned(),
        })
    }
}

fn sandbox_error(e: wasmtime::Error) -> ProtogenError {
    ProtogenError::Sandbox(format!("{:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::embedded::ECHO_MODULE;
    use crate::plugin::{EmbeddedRuntime, PluginHandler};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Asks the host for `protoc-gen-test` with "hello", reads the
    /// response, and exits with the number of bytes read.
    const BRIDGE_GUEST: &str = r#"
        (module
          (import "protoc_host" "plugin_communicate"
            (func $communicate (param i32 i32 i32 i32 i32) (result i32)))
          (import "protoc_host" "plugin_response_read"
            (func $read (param i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
          (memory (export "memory") 1)
          (data (i32.const 0) "protoc-gen-test")
          (data (i32.const 32) "hello")
          (func (export "_start")
            (drop (call $communicate
              (i32.const 0) (i32.const 15) (i32.const 0) (i32.const 32) (i32.const 5)))
            (call $exit (call $read (i32.const 64) (i32.const 64)))))
    "#;

    struct Doubler;

    #[async_trait]
    impl PluginHandler for Doubler {
        async fn communicate(
            &self,
            request: &[u8],
            _cancel: &CancellationToken,
        ) -> ProtogenResult<Vec<u8>> {
            Ok([request, request].concat())
        }
    }

    fn write_module(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("protoc.wasm");
        std::fs::write(&path, BRIDGE_GUEST).unwrap();
        path
    }

    #[test]
    fn missing_module_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = SandboxedCompiler::new(&dir.path().join("protoc.wasm"), vec![])
            .err()
            .unwrap();
        assert!(matches!(err, ProtogenError::CompilerModuleMissing(_)));
        assert!(err.hint().is_some());
    }

    #[test]
    fn staging_mounts_nest_project_under_vendor() {
        let mounts = staging_mounts(
            Path::new("/work/proj/vendor"),
            Path::new("/work/proj"),
            "example.com/m",
        );
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].guest, "/work/proj/vendor");
        assert_eq!(mounts[1].guest, "/work/proj");
        assert_eq!(mounts[2].host, PathBuf::from("/work/proj"));
        assert_eq!(mounts[2].guest, "/work/proj/vendor/example.com/m");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn plugin_round_trip_through_bridge() {
        let dir = TempDir::new().unwrap();
        let compiler = SandboxedCompiler::new(&write_module(&dir), vec![]).unwrap();

        let mut dispatch = PluginDispatch::new();
        dispatch.register("protoc-gen-test", Arc::new(Doubler));
        let dispatch = Arc::new(dispatch);
        let handle = Handle::current();

        let output = tokio::task::spawn_blocking(move || {
            compiler.run(&[], dispatch, handle, CancellationToken::new())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(output.exit_code, 10);
        assert!(!output.success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn embedded_plugin_serves_bridge_requests() {
        let dir = TempDir::new().unwrap();
        let compiler = SandboxedCompiler::new(&write_module(&dir), vec![]).unwrap();
        let plugin_path = dir.path().join("echo.wasm");
        std::fs::write(&plugin_path, ECHO_MODULE).unwrap();
        let runtime =
            EmbeddedRuntime::init(compiler.engine(), "protoc-gen-test", &plugin_path).unwrap();

        let mut dispatch = PluginDispatch::new();
        dispatch.register("protoc-gen-test", Arc::new(runtime.handler().unwrap()));
        let dispatch = Arc::new(dispatch);
        let handle = Handle::current();

        let output = tokio::task::spawn_blocking(move || {
            compiler.run(&[], dispatch, handle, CancellationToken::new())
        })
        .await
        .unwrap()
        .unwrap();

        // Echoed "hello"
        assert_eq!(output.exit_code, 5);
        drop(runtime);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatch_error_wins_over_trap() {
        let dir = TempDir::new().unwrap();
        let compiler = SandboxedCompiler::new(&write_module(&dir), vec![]).unwrap();
        let dispatch = Arc::new(PluginDispatch::new());
        let handle = Handle::current();

        let err = tokio::task::spawn_blocking(move || {
            compiler.run(&[], dispatch, handle, CancellationToken::new())
        })
        .await
        .unwrap()
        .unwrap_err();

        assert_eq!(err.to_string(), "plugin not found: protoc-gen-test");
    }
}
