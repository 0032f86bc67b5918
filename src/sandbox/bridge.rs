//! Host functions imported by the compiler module
//!
//! Import module `protoc_host`:
//!
//! | Function | Signature | Behavior |
//! |----------|-----------|----------|
//! | `plugin_communicate` | `(program_ptr, program_len, search_path, input_ptr, input_len) -> u32` | dispatch a request, return response length |
//! | `plugin_response_read` | `(dst_ptr, dst_len) -> u32` | copy the pending response, return bytes written |
//!
//! A dispatch failure is stored in the host state and the call traps, so
//! the caller sees the typed error instead of the trap.

use crate::error::ProtogenError;
use crate::plugin::PluginDispatch;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wasmtime::{Caller, Extern, Linker, Memory};
use wasmtime_wasi::preview1::WasiP1Ctx;

/// Import module name
pub const HOST_MODULE: &str = "protoc_host";

/// Per-run store data for the compiler
pub struct SandboxState {
    wasi: WasiP1Ctx,
    dispatch: Arc<PluginDispatch>,
    runtime: Handle,
    cancel: CancellationToken,
    pending_response: Option<Vec<u8>>,
    dispatch_error: Option<ProtogenError>,
}

impl SandboxState {
    pub fn new(
        wasi: WasiP1Ctx,
        dispatch: Arc<PluginDispatch>,
        runtime: Handle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            wasi,
            dispatch,
            runtime,
            cancel,
            pending_response: None,
            dispatch_error: None,
        }
    }

    /// Error recorded by a failed plugin call, if any
    pub fn take_dispatch_error(&mut self) -> Option<ProtogenError> {
        self.dispatch_error.take()
    }
}

pub(crate) fn wasi_ctx(state: &mut SandboxState) -> &mut WasiP1Ctx {
    &mut state.wasi
}

/// Link the host functions into `linker`
pub fn add_to_linker(linker: &mut Linker<SandboxState>) -> wasmtime::Result<()> {
    linker.func_wrap(HOST_MODULE, "plugin_communicate", plugin_communicate)?;
    linker.func_wrap(HOST_MODULE, "plugin_response_read", plugin_response_read)?;
    Ok(())
}

fn plugin_communicate(
    mut caller: Caller<'_, SandboxState>,
    program_ptr: u32,
    program_len: u32,
    search_path: u32,
    input_ptr: u32,
    input_len: u32,
) -> wasmtime::Result<u32> {
    let memory = guest_memory(&mut caller)?;
    let data = memory.data(&caller);
    let program = String::from_utf8(guest_slice(data, program_ptr, program_len)?.to_vec())
        .map_err(|_| wasmtime::Error::msg("plugin name is not valid UTF-8"))?;
    let request = guest_slice(data, input_ptr, input_len)?.to_vec();

    let state = caller.data();
    let dispatch = Arc::clone(&state.dispatch);
    let runtime = state.runtime.clone();
    let cancel = state.cancel.clone();

    debug!("Plugin request for {} ({} bytes)", program, request.len());
    let result = runtime.block_on(dispatch.communicate(&program, search_path != 0, &request, &cancel));

    let state = caller.data_mut();
    match result {
        Ok(response) => {
            let len = u32::try_from(response.len())
                .map_err(|_| wasmtime::Error::msg("plugin response exceeds 4 GiB"))?;
            state.pending_response = Some(response);
            Ok(len)
        }
        Err(e) => {
            let message = e.to_string();
            state.pending_response = None;
            state.dispatch_error = Some(e);
            Err(wasmtime::Error::msg(message))
        }
    }
}

fn plugin_response_read(
    mut caller: Caller<'_, SandboxState>,
    dst_ptr: u32,
    dst_len: u32,
) -> wasmtime::Result<u32> {
    let response = caller
        .data_mut()
        .pending_response
        .take()
        .ok_or_else(|| wasmtime::Error::msg("no pending plugin response"))?;
    if response.len() > dst_len as usize {
        return Err(wasmtime::Error::msg(format!(
            "response buffer too small: {} < {}",
            dst_len,
            response.len()
        )));
    }

    let memory = guest_memory(&mut caller)?;
    memory.write(&mut caller, dst_ptr as usize, &response)?;
    // Length was checked against dst_len above.
    Ok(response.len() as u32)
}

fn guest_memory(caller: &mut Caller<'_, SandboxState>) -> wasmtime::Result<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("compiler module exports no memory"))
}

/// Bounds-checked view of guest memory
fn guest_slice(data: &[u8], ptr: u32, len: u32) -> wasmtime::Result<&[u8]> {
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| wasmtime::Error::msg(format!("guest range {}+{} out of bounds", ptr, len)))?;
    Ok(&data[start..end])
}
