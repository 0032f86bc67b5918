//! protogen - incremental protobuf code generation
//!
//! Runs protoc compiled to WASI in a wasmtime sandbox, dispatching plugin
//! calls to native or embedded generators, and regenerates only the proto
//! packages whose sources, flags or tool versions changed.

pub mod cache;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod generator;
pub mod plugin;
pub mod postprocess;
pub mod sandbox;
pub mod tools;
pub mod ui;

pub use error::{ProtogenError, ProtogenResult};
