//! Forge Output
//!
//! Everything that touches the filesystem or spawns processes on behalf of a
//! generation.
//!
//! - [`ArtifactPersister`]: writes parsed artifacts into `{type}_{subject}`
//! - [`ScaffoldToolbox`]: file tools an agent uses inside a scaffold project
//! - [`ProjectBuilder`]: install + build with one deadline, behind [`ProjectBuild`]

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod builder;
mod error;
mod persister;
mod tools;

pub use builder::{BuildConfig, BuildResult, ProjectBuild, ProjectBuilder, TIMEOUT_REASON};
pub use error::{PersistError, ToolError};
pub use persister::{write_atomic, ArtifactPersister, PersistedArtifact};
pub use tools::{ScaffoldTool, ScaffoldToolbox, IGNORED_DIRS, PROTECTED_FILES};
