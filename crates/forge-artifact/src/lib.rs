//! Forge Artifact System
//!
//! Types shared by every stage of the generation pipeline.
//!
//! # Core Concepts
//!
//! - [`ArtifactType`]: closed set of generation strategies (single file, multi file, scaffold)
//! - [`ArtifactKey`]: `(type, subject)` pair naming a session and a persisted directory
//! - [`ArtifactPath`]: validated relative path that cannot escape its directory
//! - [`ParsedArtifact`]: ordered `(path, content)` set with last-write-wins inserts
//! - [`ArtifactStrategy`]: per-type parser and build capability
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_artifact::ArtifactType;
//!
//! let text = "File: index.html\n```html\n<h1>Hi</h1>\n```\n";
//! let artifact = ArtifactType::MultiFile.parse(text)?;
//! assert_eq!(artifact.len(), 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod error;
mod kind;
pub mod multi_file;
mod path;
mod strategy;

pub use artifact::{ArtifactFile, ParsedArtifact};
pub use error::{KeyError, ParseError};
pub use kind::{ArtifactKey, ArtifactType, SubjectId};
pub use path::{ArtifactPath, PathError};
pub use strategy::{
    ArtifactStrategy, MultiFileStrategy, ScaffoldStrategy, SingleFileStrategy, SINGLE_FILE_NAME,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
