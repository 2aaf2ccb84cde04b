//! Error types for the generation pipeline
//!
//! - [`PipelineError`]: everything a caller of the pipeline can see
//! - [`ModelError`]: failures reported by a model binding
//! - [`HistoryError`]: chat history store failures (logged, never surfaced)
//! - [`ConfigError`]: configuration loading

use forge_artifact::{KeyError, ParseError};
use forge_output::PersistError;
use std::path::PathBuf;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Caller input rejected before any work started
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Artifact type value not recognized
    #[error("unsupported artifact type: {0}")]
    UnsupportedArtifactType(String),

    /// Model response contained no usable file
    #[error("empty artifact: {0}")]
    EmptyArtifact(String),

    /// Writing the artifact failed
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistError),

    /// Model call failed
    #[error("model failed: {0}")]
    Model(#[from] ModelError),

    /// Model stream ended in failure
    #[error("stream failed: {0}")]
    StreamFailed(String),

    /// Session could not be created
    #[error("session error: {0}")]
    Session(String),
}

impl PipelineError {
    /// Check if the caller may retry the same request
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(e) => e.is_retryable(),
            Self::StreamFailed(_) => true,
            _ => false,
        }
    }

    /// Short machine-readable name of the variant
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnsupportedArtifactType(_) => "unsupported_artifact_type",
            Self::EmptyArtifact(_) => "empty_artifact",
            Self::Persistence(_) => "persistence",
            Self::Model(_) => "model",
            Self::StreamFailed(_) => "stream_failed",
            Self::Session(_) => "session",
        }
    }
}

impl From<KeyError> for PipelineError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::UnsupportedType(value) => Self::UnsupportedArtifactType(value),
            KeyError::InvalidSubject(_) => Self::InvalidArgument(err.to_string()),
        }
    }
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::EmptyArtifact(reason) => Self::EmptyArtifact(reason),
            ParseError::ToolPopulated(_) => Self::InvalidArgument(err.to_string()),
            ParseError::InvalidPath(e) => Self::EmptyArtifact(e.to_string()),
        }
    }
}

/// Model binding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Backend unreachable or overloaded
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Backend asked us to slow down
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Backend refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Binding does not support the requested call
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ModelError {
    /// Check if a later attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited(_))
    }
}

/// Chat history store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum HistoryError {
    /// Store unreachable
    #[error("history store unavailable: {0}")]
    Unavailable(String),

    /// Store returned an error
    #[error("history store error: {0}")]
    Backend(String),
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML did not match the schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are unusable
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_artifact::ArtifactType;

    #[test]
    fn key_errors_map_to_caller_errors() {
        let unsupported: PipelineError = KeyError::UnsupportedType("pdf".into()).into();
        assert!(matches!(unsupported, PipelineError::UnsupportedArtifactType(ref v) if v == "pdf"));

        let subject: PipelineError = KeyError::InvalidSubject(0).into();
        assert_eq!(subject.kind(), "invalid_argument");
    }

    #[test]
    fn parse_errors_map() {
        let empty: PipelineError = ParseError::empty("nothing").into();
        assert!(matches!(empty, PipelineError::EmptyArtifact(_)));

        let tool: PipelineError = ParseError::ToolPopulated(ArtifactType::Scaffold).into();
        assert_eq!(tool.kind(), "invalid_argument");
    }

    #[test]
    fn retryable_classification() {
        assert!(PipelineError::Model(ModelError::Unavailable("503".into())).is_retryable());
        assert!(PipelineError::Model(ModelError::RateLimited("429".into())).is_retryable());
        assert!(!PipelineError::Model(ModelError::Rejected("policy".into())).is_retryable());
        assert!(PipelineError::StreamFailed("reset".into()).is_retryable());
        assert!(!PipelineError::InvalidArgument("x".into()).is_retryable());
        assert!(!PipelineError::EmptyArtifact("x".into()).is_retryable());
    }
}
