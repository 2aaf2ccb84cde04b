//! Parsed artifact: the ordered file set produced from one model response

use crate::path::ArtifactPath;
use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

/// Ordered set of `(path, content)` pairs
///
/// Paths are unique. Inserting an existing path drops the earlier entry and
/// appends the new one, so the last occurrence wins and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArtifact {
    files: IndexMap<ArtifactPath, String>,
}

/// Borrowed view of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactFile<'a> {
    /// Relative path
    pub path: &'a ArtifactPath,
    /// File content
    pub content: &'a str,
}

impl ParsedArtifact {
    /// Create empty artifact
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact holding exactly one file
    #[must_use]
    pub fn single(path: ArtifactPath, content: impl Into<String>) -> Self {
        let mut artifact = Self::new();
        artifact.insert(path, content);
        artifact
    }

    /// Insert a file, replacing any earlier file with the same path
    ///
    /// Returns the replaced content, if any.
    pub fn insert(&mut self, path: ArtifactPath, content: impl Into<String>) -> Option<String> {
        let previous = self.files.shift_remove(&path);
        self.files.insert(path, content.into());
        previous
    }

    /// Look up a file by path
    #[must_use]
    pub fn get(&self, path: &ArtifactPath) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Number of files
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when no file was parsed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files in order
    pub fn iter(&self) -> impl Iterator<Item = ArtifactFile<'_>> {
        self.files.iter().map(|(path, content)| ArtifactFile {
            path,
            content: content.as_str(),
        })
    }

    /// Paths in order
    pub fn paths(&self) -> impl Iterator<Item = &ArtifactPath> {
        self.files.keys()
    }
}

impl Serialize for ParsedArtifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'a> IntoIterator for &'a ParsedArtifact {
    type Item = ArtifactFile<'a>;
    type IntoIter = Box<dyn Iterator<Item = ArtifactFile<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
