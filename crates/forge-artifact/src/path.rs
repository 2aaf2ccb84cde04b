//! Relative file paths inside an artifact
//!
//! Provides [`ArtifactPath`], a validated, normalized path that can always be
//! resolved safely under an artifact directory.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Relative path of one file within an artifact
///
/// Stored as `/`-separated segments. Construction rejects anything that could
/// escape the artifact directory.
///
/// # Examples
/// - `src/App.vue` → `["src", "App.vue"]`
/// - `./css\\style.css` → `["css", "style.css"]`
/// - `../secret` → [`PathError::Traversal`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactPath(Vec<String>);

impl ArtifactPath {
    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: a valid path has at least one segment
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Final segment (the file name)
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Parent directory segments, if any
    #[inline]
    #[must_use]
    pub fn parent_segments(&self) -> &[String] {
        &self.0[..self.0.len().saturating_sub(1)]
    }

    /// Resolve this path under a base directory
    #[must_use]
    pub fn resolve(&self, base: &Path) -> PathBuf {
        let mut out = base.to_path_buf();
        for segment in &self.0 {
            out.push(segment);
        }
        out
    }

    /// Join segments with `/`
    #[inline]
    #[must_use]
    pub fn as_slash_path(&self) -> String {
        self.0.join("/")
    }

    /// Check whether the path starts with the given segments
    #[must_use]
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.0.len() && self.0.iter().zip(prefix).all(|(a, b)| a == b)
    }
}

impl Display for ArtifactPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl FromStr for ArtifactPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('\\', "/");
        if normalized.is_empty() {
            return Err(PathError::Empty);
        }
        if normalized.starts_with('/') || has_drive_prefix(&normalized) {
            return Err(PathError::Absolute(s.to_string()));
        }

        let mut segments = Vec::new();
        for seg in normalized.split('/') {
            match seg {
                "" | "." => {}
                ".." => return Err(PathError::Traversal(s.to_string())),
                seg if seg.chars().any(char::is_control) => {
                    return Err(PathError::InvalidSegment(seg.to_string()));
                }
                seg => segments.push(seg.to_string()),
            }
        }

        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments))
    }
}

impl TryFrom<String> for ArtifactPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactPath> for String {
    fn from(path: ArtifactPath) -> Self {
        path.to_string()
    }
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Errors related to artifact paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Path has no usable segment
    #[error("path is empty")]
    Empty,

    /// Path is absolute
    #[error("path must be relative: {0}")]
    Absolute(String),

    /// Path contains a `..` segment
    #[error("path escapes the artifact directory: {0}")]
    Traversal(String),

    /// Segment contains control characters
    #[error("invalid segment: {0:?}")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn path_from_str_valid() {
        let path: ArtifactPath = "src/components/App.vue".parse().unwrap();
        assert_eq!(path.segments(), &["src", "components", "App.vue"]);
        assert_eq!(path.len(), 3);
        assert_eq!(path.file_name(), "App.vue");
        assert_eq!(path.parent_segments(), &["src", "components"]);
    }

    #[test]
    fn path_normalizes_separators_and_dots() {
        let path: ArtifactPath = "./css\\style.css".parse().unwrap();
        assert_eq!(path.to_string(), "css/style.css");

        let path: ArtifactPath = "a//b/./c.js".parse().unwrap();
        assert_eq!(path.as_slash_path(), "a/b/c.js");
    }

    #[test]
    fn path_from_str_empty() {
        assert_eq!("".parse::<ArtifactPath>(), Err(PathError::Empty));
        assert_eq!("   ".parse::<ArtifactPath>(), Err(PathError::Empty));
        assert_eq!("./".parse::<ArtifactPath>(), Err(PathError::Empty));
    }

    #[test]
    fn path_rejects_absolute() {
        assert!(matches!("/etc/passwd".parse::<ArtifactPath>(), Err(PathError::Absolute(_))));
        assert!(matches!("C:\\x.js".parse::<ArtifactPath>(), Err(PathError::Absolute(_))));
    }

    #[test]
    fn path_rejects_traversal() {
        assert!(matches!("../x.js".parse::<ArtifactPath>(), Err(PathError::Traversal(_))));
        assert!(matches!("a/../../x.js".parse::<ArtifactPath>(), Err(PathError::Traversal(_))));
    }

    #[test]
    fn path_rejects_control_chars() {
        assert!(matches!("a\u{0}b.js".parse::<ArtifactPath>(), Err(PathError::InvalidSegment(_))));
    }

    #[test]
    fn path_resolve_under_base() {
        let path: ArtifactPath = "src/main.js".parse().unwrap();
        let resolved = path.resolve(Path::new("/tmp/out"));
        assert_eq!(resolved, PathBuf::from("/tmp/out/src/main.js"));
    }

    #[test]
    fn path_starts_with() {
        let path: ArtifactPath = "node_modules/pkg/index.js".parse().unwrap();
        assert!(path.starts_with(&["node_modules"]));
        assert!(!path.starts_with(&["src"]));
    }

    #[test]
    fn path_serde_as_string() {
        let path: ArtifactPath = "a/b.js".parse().unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"a/b.js\"");

        let back: ArtifactPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);

        assert!(serde_json::from_str::<ArtifactPath>("\"../x\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_parsed_paths_never_escape(raw in "[a-z./\\\\]{0,24}") {
            if let Ok(path) = raw.parse::<ArtifactPath>() {
                prop_assert!(!path.is_empty());
                prop_assert!(path.segments().iter().all(|s| s != ".." && s != "." && !s.is_empty()));
                let base = Path::new("/base");
                prop_assert!(path.resolve(base).starts_with(base));
            }
        }
    }
}
