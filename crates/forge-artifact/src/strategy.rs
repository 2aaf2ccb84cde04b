//! Artifact strategies
//!
//! One strategy per [`ArtifactType`], selected by the enum:
//! - Single file: the whole response is `index.html`
//! - Multi file: labeled fenced blocks (see [`crate::multi_file`])
//! - Scaffold: files are written by tool calls, nothing to parse

use crate::artifact::ParsedArtifact;
use crate::error::ParseError;
use crate::kind::ArtifactType;
use crate::multi_file;
use crate::path::ArtifactPath;

/// File name used by the single-file strategy
pub const SINGLE_FILE_NAME: &str = "index.html";

/// Capability interface shared by all strategies
pub trait ArtifactStrategy: Send + Sync + 'static {
    /// The artifact type this strategy serves
    fn kind(&self) -> ArtifactType;

    /// Parse a complete model response
    ///
    /// # Errors
    /// - [`ParseError::EmptyArtifact`] if no usable file results
    /// - [`ParseError::ToolPopulated`] for strategies without a text grammar
    fn parse(&self, raw: &str) -> Result<ParsedArtifact, ParseError>;

    /// Whether a persisted artifact must go through the project builder
    fn requires_build(&self) -> bool {
        false
    }

    /// Whether files are produced by tool calls during generation
    fn is_tool_driven(&self) -> bool {
        false
    }
}

/// Whole response is one file
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleFileStrategy;

impl ArtifactStrategy for SingleFileStrategy {
    fn kind(&self) -> ArtifactType {
        ArtifactType::SingleFile
    }

    fn parse(&self, raw: &str) -> Result<ParsedArtifact, ParseError> {
        if raw.trim().is_empty() {
            return Err(ParseError::empty("response is blank"));
        }
        let path: ArtifactPath = SINGLE_FILE_NAME.parse()?;
        Ok(ParsedArtifact::single(path, raw))
    }
}

/// Labeled fenced blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiFileStrategy;

impl ArtifactStrategy for MultiFileStrategy {
    fn kind(&self) -> ArtifactType {
        ArtifactType::MultiFile
    }

    fn parse(&self, raw: &str) -> Result<ParsedArtifact, ParseError> {
        multi_file::parse_blocks(raw)
    }
}

/// Tool-populated project directory
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaffoldStrategy;

impl ArtifactStrategy for ScaffoldStrategy {
    fn kind(&self) -> ArtifactType {
        ArtifactType::Scaffold
    }

    fn parse(&self, _raw: &str) -> Result<ParsedArtifact, ParseError> {
        Err(ParseError::ToolPopulated(ArtifactType::Scaffold))
    }

    fn requires_build(&self) -> bool {
        true
    }

    fn is_tool_driven(&self) -> bool {
        true
    }
}

impl ArtifactType {
    /// Strategy for this artifact type
    #[must_use]
    pub fn strategy(self) -> &'static dyn ArtifactStrategy {
        match self {
            Self::SingleFile => &SingleFileStrategy,
            Self::MultiFile => &MultiFileStrategy,
            Self::Scaffold => &ScaffoldStrategy,
        }
    }

    /// Parse a complete response with this type's grammar
    ///
    /// # Errors
    /// See [`ArtifactStrategy::parse`].
    pub fn parse(self, raw: &str) -> Result<ParsedArtifact, ParseError> {
        self.strategy().parse(raw)
    }

    /// Whether this type runs the project builder
    #[inline]
    #[must_use]
    pub fn requires_build(self) -> bool {
        self.strategy().requires_build()
    }

    /// Whether this type is generated through tool calls
    #[inline]
    #[must_use]
    pub fn is_tool_driven(self) -> bool {
        self.strategy().is_tool_driven()
    }
}
