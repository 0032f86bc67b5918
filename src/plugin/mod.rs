//! Code generator plugins
//!
//! Discovery of available generators, and the dispatch table that answers
//! plugin requests coming out of the sandboxed compiler.

pub mod dispatch;
pub mod embedded;
pub mod registry;

pub use dispatch::{NativePluginHandler, PluginDispatch, PluginHandler};
pub use embedded::{EmbeddedPlugin, EmbeddedPluginHandler, EmbeddedRuntime};
pub use registry::{Plugin, PluginDiscovery, PluginKind, PluginRegistry, Target};
