//! Error types for artifact keys and parsing

use crate::kind::ArtifactType;
use crate::path::PathError;

/// Errors building an [`ArtifactKey`](crate::ArtifactKey) from caller input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Subject identifier is zero or negative
    #[error("subject id must be positive, got {0}")]
    InvalidSubject(i64),

    /// Wire value names no artifact type
    #[error("unsupported artifact type: '{0}'")]
    UnsupportedType(String),
}

/// Errors turning model output into a [`ParsedArtifact`](crate::ParsedArtifact)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Output produced no usable file
    #[error("empty artifact: {0}")]
    EmptyArtifact(String),

    /// Artifact files come from tool calls, not from text
    #[error("{0} artifacts are populated by tool calls and are never parsed")]
    ToolPopulated(ArtifactType),

    /// A declared path failed validation
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
}

impl ParseError {
    /// Create empty artifact error
    pub fn empty(reason: impl Into<String>) -> Self {
        Self::EmptyArtifact(reason.into())
    }
}
