//! Artifact types and persistence keys
//!
//! [`ArtifactType`] is the closed set of generation strategies. Together with
//! a [`SubjectId`] it forms an [`ArtifactKey`], whose directory name is part of
//! the contract with the deploy and download paths.

use crate::error::KeyError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Kind of artifact a generation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// One self-contained file (`index.html`)
    SingleFile,
    /// Several files parsed from labeled fenced blocks
    MultiFile,
    /// Project directory populated by agent tool calls, then built
    Scaffold,
}

impl ArtifactType {
    /// All artifact types
    pub const ALL: [ArtifactType; 3] = [Self::SingleFile, Self::MultiFile, Self::Scaffold];

    /// Wire value, also the directory prefix
    #[inline]
    #[must_use]
    pub fn value(self) -> &'static str {
        match self {
            Self::SingleFile => "single_file",
            Self::MultiFile => "multi_file",
            Self::Scaffold => "scaffold",
        }
    }

    /// Human readable label
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::SingleFile => "single file",
            Self::MultiFile => "multi file",
            Self::Scaffold => "project scaffold",
        }
    }

    /// Resolve a wire value
    ///
    /// Accepts the legacy values `html` and `vue_project` as aliases.
    ///
    /// # Errors
    /// [`KeyError::UnsupportedType`] for anything else.
    pub fn from_value(value: &str) -> Result<Self, KeyError> {
        match value {
            "single_file" | "html" => Ok(Self::SingleFile),
            "multi_file" => Ok(Self::MultiFile),
            "scaffold" | "vue_project" => Ok(Self::Scaffold),
            other => Err(KeyError::UnsupportedType(other.to_string())),
        }
    }
}

impl Display for ArtifactType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for ArtifactType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_value(s)
    }
}

/// Owning entity of generation state (an application or conversation)
///
/// Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SubjectId(i64);

impl SubjectId {
    /// Validate a raw identifier
    ///
    /// # Errors
    /// [`KeyError::InvalidSubject`] when `raw <= 0`.
    pub fn new(raw: i64) -> Result<Self, KeyError> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(KeyError::InvalidSubject(raw))
        }
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl Display for SubjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for SubjectId {
    type Error = KeyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for i64 {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

/// Identity of one persisted artifact and of one generation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Artifact type
    pub kind: ArtifactType,
    /// Owning subject
    pub subject: SubjectId,
}

impl ArtifactKey {
    /// Create key
    #[inline]
    #[must_use]
    pub fn new(kind: ArtifactType, subject: SubjectId) -> Self {
        Self { kind, subject }
    }

    /// Directory name: `{type_value}_{subject}`
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.kind.value(), self.subject)
    }
}

impl Display for ArtifactKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}
