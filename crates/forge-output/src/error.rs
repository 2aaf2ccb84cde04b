//! Error types for the output boundary
//!
//! - Persist operations (artifact → directory)
//! - Tool operations (agent file tools inside a scaffold)

use forge_artifact::PathError;
use std::path::PathBuf;

/// Errors while persisting an artifact
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Artifact has no file to write
    #[error("artifact has no files")]
    EmptyArtifact,

    /// Target path has no parent directory
    #[error("invalid target path: {0}")]
    InvalidTarget(PathBuf),

    /// IO error during directory creation or file write
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors while executing a scaffold tool
///
/// Never raised to the agent: the toolbox renders them as result text.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Tool name not in the tool set
    #[error("there is no tool called {0}")]
    UnknownTool(String),

    /// Arguments did not match the tool's schema
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    /// Declared path escapes the project or is malformed
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// File or directory does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation refused by policy
    #[error("refused: {0}")]
    Refused(String),

    /// Underlying write failed
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// IO error during read or delete
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
