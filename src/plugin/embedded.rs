//! In-process WASI code generator
//!
//! The prost generator ships as a WASI module and runs on the compiler's
//! engine, so Rust output needs no native toolchain. A fresh store is
//! created per request with the request on stdin.
//!
//! Requests arrive from inside the bridge's `block_on`, and the sync WASI
//! host functions enter the runtime themselves, so each run happens on a
//! separate blocking thread.

use crate::error::{ProtogenError, ProtogenResult};
use crate::plugin::dispatch::PluginHandler;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wasmtime::{Engine, Linker, Module, Store};
use wasmtime_wasi::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

const OUTPUT_CAPACITY: usize = 64 * 1024 * 1024;

/// A compiled WASI plugin module
pub struct EmbeddedPlugin {
    program: String,
    engine: Engine,
    module: Module,
}

impl EmbeddedPlugin {
    /// Compile the module at `module_path` on `engine`
    pub fn init(engine: &Engine, program: &str, module_path: &Path) -> ProtogenResult<Self> {
        debug!("Compiling embedded plugin {}", module_path.display());
        let module = Module::from_file(engine, module_path).map_err(|e| {
            ProtogenError::EmbeddedPlugin {
                program: program.to_string(),
                reason: format!("{}: {:#}", module_path.display(), e),
            }
        })?;

        Ok(Self {
            program: program.to_string(),
            engine: engine.clone(),
            module,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the module once with `request` on stdin and return stdout
    pub fn execute(&self, request: &[u8]) -> ProtogenResult<Vec<u8>> {
        let stdout = MemoryOutputPipe::new(OUTPUT_CAPACITY);
        let stderr = MemoryOutputPipe::new(OUTPUT_CAPACITY);

        let mut builder = WasiCtxBuilder::new();
        builder
            .args(&[self.program.as_str()])
            .stdin(MemoryInputPipe::new(request.to_vec()))
            .stdout(stdout.clone())
            .stderr(stderr.clone());
        let wasi = builder.build_p1();

        let mut store = Store::new(&self.engine, wasi);
        store.set_epoch_deadline(1);

        let mut linker: Linker<WasiP1Ctx> = Linker::new(&self.engine);
        preview1::add_to_linker_sync(&mut linker, |ctx| ctx).map_err(|e| self.error(e))?;

        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| self.error(e))?;
        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(|e| self.error(e))?;

        let code = match start.call(&mut store, ()) {
            Ok(()) => 0,
            Err(e) => match e.downcast_ref::<I32Exit>() {
                Some(exit) => exit.0,
                None if is_interrupt(&e) => return Err(ProtogenError::Cancelled),
                None => return Err(self.error(e)),
            },
        };

        if code != 0 {
            return Err(ProtogenError::PluginFailed {
                program: self.program.clone(),
                status: format!("exit code {}", code),
                stderr: String::from_utf8_lossy(&stderr.contents()).trim().to_string(),
            });
        }

        Ok(stdout.contents().to_vec())
    }

    fn error(&self, e: wasmtime::Error) -> ProtogenError {
        ProtogenError::EmbeddedPlugin {
            program: self.program.clone(),
            reason: format!("{:#}", e),
        }
    }
}

pub(crate) fn is_interrupt(e: &wasmtime::Error) -> bool {
    matches!(e.downcast_ref::<wasmtime::Trap>(), Some(wasmtime::Trap::Interrupt))
}

/// Owns the embedded plugin for the duration of one compiler run
pub struct EmbeddedRuntime {
    plugin: Option<Arc<EmbeddedPlugin>>,
}

impl EmbeddedRuntime {
    /// Compile the plugin module; call after the sandbox engine exists
    pub fn init(engine: &Engine, program: &str, module_path: &Path) -> ProtogenResult<Self> {
        let plugin = EmbeddedPlugin::init(engine, program, module_path)?;
        Ok(Self {
            plugin: Some(Arc::new(plugin)),
        })
    }

    /// Handler for the dispatch table; fails once the runtime is closed
    pub fn handler(&self) -> Option<EmbeddedPluginHandler> {
        self.plugin.as_ref().map(|plugin| EmbeddedPluginHandler {
            program: plugin.program().to_string(),
            plugin: Arc::downgrade(plugin),
        })
    }

    /// Release the plugin. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        match self.plugin.take() {
            Some(plugin) => {
                debug!("Closing embedded plugin {}", plugin.program());
                true
            }
            None => false,
        }
    }
}

impl Drop for EmbeddedRuntime {
    fn drop(&mut self) {
        self.close();
    }
}

/// Dispatch handler backed by an [`EmbeddedRuntime`]
pub struct EmbeddedPluginHandler {
    program: String,
    plugin: Weak<EmbeddedPlugin>,
}

#[async_trait]
impl PluginHandler for EmbeddedPluginHandler {
    async fn communicate(
        &self,
        request: &[u8],
        cancel: &CancellationToken,
    ) -> ProtogenResult<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(ProtogenError::Cancelled);
        }
        let plugin = self
            .plugin
            .upgrade()
            .ok_or_else(|| ProtogenError::EmbeddedPlugin {
                program: self.program.clone(),
                reason: "runtime already closed".to_string(),
            })?;

        let request = request.to_vec();
        tokio::task::spawn_blocking(move || plugin.execute(&request))
            .await
            .map_err(|e| ProtogenError::EmbeddedPlugin {
                program: self.program.clone(),
                reason: format!("plugin task failed: {}", e),
            })?
    }
}

/// Copies up to 1 KiB from stdin to stdout
#[cfg(test)]
pub(crate) const ECHO_MODULE: &str = r#"
    (module
      (import "wasi_snapshot_preview1" "fd_read"
        (func $fd_read (param i32 i32 i32 i32) (result i32)))
      (import "wasi_snapshot_preview1" "fd_write"
        (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (memory (export "memory") 1)
      (func (export "_start")
        (i32.store (i32.const 0) (i32.const 64))
        (i32.store (i32.const 4) (i32.const 1024))
        (drop (call $fd_read (i32.const 0) (i32.const 0) (i32.const 1) (i32.const 16)))
        (i32.store (i32.const 4) (i32.load (i32.const 16)))
        (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 20)))))
"#;
