//! Error types for protogen
//!
//! All modules use `ProtogenResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protogen operations
pub type ProtogenResult<T> = Result<T, ProtogenError>;

/// All errors that can occur in protogen
#[derive(Error, Debug)]
pub enum ProtogenError {
    // Configuration errors
    #[error("Cannot resolve project directory {path}: {source}")]
    ProjectDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Project manifest not found: {0}")]
    ManifestMissing(PathBuf),

    #[error("No module directive in {0}")]
    ModulePathMissing(PathBuf),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Tools directory not found: {0}")]
    ToolsDirMissing(PathBuf),

    // Cache errors
    #[error("Failed to save cache {path}: {source}")]
    CacheSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Plugin errors
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Failed to start plugin {program}: {source}")]
    PluginSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin {program} failed ({status}): {stderr}")]
    PluginFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Embedded plugin {program}: {reason}")]
    EmbeddedPlugin { program: String, reason: String },

    // Sandbox errors
    #[error("Compiler module not found: {0}")]
    CompilerModuleMissing(PathBuf),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("protoc failed with exit code {code}: {stderr}")]
    CompilerFailed { code: i32, stderr: String },

    #[error("Generation cancelled")]
    Cancelled,

    // Post-processing errors
    #[error("Failed to post-process {path}: {source}")]
    PostProcess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Tooling errors
    #[error("{tool} failed: {stderr}")]
    Formatter { tool: String, stderr: String },

    #[error("Failed to build {tool}: {reason}")]
    ToolBuild { tool: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtogenError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a post-processing error for a file
    pub fn post_process(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PostProcess {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is the result of run cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ManifestMissing(_) | Self::ModulePathMissing(_) => {
                Some("Run from a directory containing go.mod, or pass --project-dir")
            }
            Self::ToolsDirMissing(_) | Self::CompilerModuleMissing(_) => {
                Some("Populate the tools directory, then run: protogen deps")
            }
            Self::PluginNotFound(_) => Some("Run: protogen deps"),
            Self::ConfigInvalid { .. } => Some("Check .protogen.toml for syntax errors"),
            _ => None,
        }
    }
}
