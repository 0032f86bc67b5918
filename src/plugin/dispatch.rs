//! Plugin dispatch for compiler plugin requests
//!
//! The sandboxed compiler cannot spawn processes. Each plugin invocation
//! crosses the host bridge as `(program, request bytes)` and is routed here
//! to a handler registered under that program name.

use crate::error::{ProtogenError, ProtogenResult};
use crate::plugin::registry::PluginRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Something that can answer a serialized CodeGeneratorRequest
#[async_trait]
pub trait PluginHandler: Send + Sync {
    /// Send the request and return the raw response bytes
    async fn communicate(&self, request: &[u8], cancel: &CancellationToken)
        -> ProtogenResult<Vec<u8>>;
}

/// Runs a native plugin executable over stdin/stdout
pub struct NativePluginHandler {
    program: String,
    path: PathBuf,
}

impl NativePluginHandler {
    pub fn new(program: impl Into<String>, path: PathBuf) -> Self {
        Self {
            program: program.into(),
            path,
        }
    }
}

#[async_trait]
impl PluginHandler for NativePluginHandler {
    async fn communicate(
        &self,
        request: &[u8],
        cancel: &CancellationToken,
    ) -> ProtogenResult<Vec<u8>> {
        debug!("Running plugin {} ({})", self.program, self.path.display());

        let mut child = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProtogenError::PluginSpawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProtogenError::Internal("plugin stdin not piped".to_string()))?;
        let request = request.to_vec();
        let writer = async move {
            // A plugin that exits without reading closes the pipe early;
            // its exit status reports the real failure.
            let _ = stdin.write_all(&request).await;
            drop(stdin);
        };

        let run = async {
            let (_, output) = tokio::join!(writer, child.wait_with_output());
            output
        };

        let output = tokio::select! {
            output = run => output.map_err(|e| {
                ProtogenError::command_failed(self.program.clone(), e)
            })?,
            _ = cancel.cancelled() => return Err(ProtogenError::Cancelled),
        };

        if !output.status.success() {
            return Err(ProtogenError::PluginFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Routes plugin requests by program name
#[derive(Default)]
pub struct PluginDispatch {
    handlers: HashMap<String, Arc<dyn PluginHandler>>,
}

impl PluginDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register native handlers for every plugin with an executable
    pub fn from_registry(registry: &PluginRegistry) -> Self {
        let mut dispatch = Self::new();
        for plugin in registry.plugins() {
            if let Some(ref path) = plugin.path {
                dispatch.register(
                    plugin.binary_name.clone(),
                    Arc::new(NativePluginHandler::new(&plugin.binary_name, path.clone())),
                );
            }
        }
        dispatch
    }

    /// Register or replace the handler for a program
    pub fn register(&mut self, program: impl Into<String>, handler: Arc<dyn PluginHandler>) {
        self.handlers.insert(program.into(), handler);
    }

    pub fn contains(&self, program: &str) -> bool {
        self.handlers.contains_key(program)
    }

    /// Answer a plugin request from the compiler
    pub async fn communicate(
        &self,
        program: &str,
        search_path: bool,
        request: &[u8],
        cancel: &CancellationToken,
    ) -> ProtogenResult<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(ProtogenError::Cancelled);
        }

        if let Some(handler) = self.handlers.get(program) {
            return handler.communicate(request, cancel).await;
        }

        if search_path {
            if let Ok(path) = which::which(program) {
                debug!("Resolved {} from PATH: {}", program, path.display());
                return NativePluginHandler::new(program, path)
                    .communicate(request, cancel)
                    .await;
            }
        }

        Err(ProtogenError::PluginNotFound(program.to_string()))
    }
}
