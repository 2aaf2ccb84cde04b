//! Artifact persistence
//!
//! Writes a [`ParsedArtifact`] into `{type}_{subject}` under the output root.
//! Each file goes to a temporary sibling first and is renamed into place, so a
//! reader of the directory sees either the old file or the new one.

use crate::error::PersistError;
use forge_artifact::{ArtifactKey, ArtifactPath, ParsedArtifact};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Result of a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedArtifact {
    /// Artifact directory
    pub directory: PathBuf,
    /// Files written, in artifact order
    pub written: Vec<ArtifactPath>,
    /// Files skipped because their content was blank
    pub skipped: Vec<ArtifactPath>,
}

/// Filesystem writer for generated artifacts
#[derive(Debug, Clone)]
pub struct ArtifactPersister {
    root: PathBuf,
}

impl ArtifactPersister {
    /// Create persister rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a key (may not exist yet)
    #[must_use]
    pub fn directory(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    /// Whether the directory for a key exists
    #[must_use]
    pub fn exists(&self, key: &ArtifactKey) -> bool {
        self.directory(key).is_dir()
    }

    /// Create the directory for a key, with parents
    ///
    /// Used for scaffold generations whose files arrive through tools.
    ///
    /// # Errors
    /// [`PersistError::Io`] if the directory cannot be created.
    pub fn prepare(&self, key: &ArtifactKey) -> Result<PathBuf, PersistError> {
        let dir = self.directory(key);
        fs::create_dir_all(&dir).map_err(|e| PersistError::io_error(&dir, e))?;
        tracing::debug!(directory = %dir.display(), "prepared artifact directory");
        Ok(dir)
    }

    /// Write every non-blank file of `artifact` under the key's directory
    ///
    /// Existing files with the same path are replaced; other files are left
    /// in place.
    ///
    /// # Errors
    /// - [`PersistError::EmptyArtifact`] for an artifact without files
    /// - [`PersistError::Io`] on the first failed write
    pub fn save(
        &self,
        artifact: &ParsedArtifact,
        key: &ArtifactKey,
    ) -> Result<PersistedArtifact, PersistError> {
        if artifact.is_empty() {
            return Err(PersistError::EmptyArtifact);
        }

        let directory = self.prepare(key)?;
        let mut written = Vec::with_capacity(artifact.len());
        let mut skipped = Vec::new();

        for file in artifact {
            if file.content.trim().is_empty() {
                tracing::warn!(path = %file.path, "skipping blank file");
                skipped.push(file.path.clone());
                continue;
            }
            write_atomic(&file.path.resolve(&directory), file.content.as_bytes())?;
            written.push(file.path.clone());
        }

        tracing::info!(
            key = %key,
            directory = %directory.display(),
            written = written.len(),
            skipped = skipped.len(),
            "artifact persisted"
        );

        Ok(PersistedArtifact {
            directory,
            written,
            skipped,
        })
    }
}

/// Replace `target` with `content` via a temporary sibling and a rename
///
/// Parent directories are created as needed.
///
/// # Errors
/// [`PersistError`] if the target has no parent or any IO step fails.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<(), PersistError> {
    let parent = target
        .parent()
        .ok_or_else(|| PersistError::InvalidTarget(target.to_path_buf()))?;
    fs::create_dir_all(parent).map_err(|e| PersistError::io_error(parent, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".forge-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| PersistError::io_error(parent, e))?;

    tmp.write_all(content)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| PersistError::io_error(tmp.path(), e))?;

    // NamedTempFile is created 0600
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
            .map_err(|e| PersistError::io_error(tmp.path(), e))?;
    }

    tmp.persist(target)
        .map_err(|e| PersistError::io_error(target, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_artifact::{ArtifactType, SubjectId};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn key(kind: ArtifactType, subject: i64) -> ArtifactKey {
        ArtifactKey::new(kind, SubjectId::new(subject).unwrap())
    }

    fn p(s: &str) -> ArtifactPath {
        s.parse().unwrap()
    }

    fn artifact(files: &[(&str, &str)]) -> ParsedArtifact {
        let mut artifact = ParsedArtifact::new();
        for (path, content) in files {
            artifact.insert(p(path), *content);
        }
        artifact
    }

    /// Sorted `(relative path, content)` of every file under `dir`
    fn snapshot(dir: &Path) -> Vec<(String, String)> {
        fn walk(base: &Path, dir: &Path, out: &mut Vec<(String, String)>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(base, &path, out);
                } else {
                    let rel = path.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/");
                    out.push((rel, fs::read_to_string(&path).unwrap()));
                }
            }
        }
        let mut out = Vec::new();
        walk(dir, dir, &mut out);
        out.sort();
        out
    }

    #[test]
    fn directory_follows_naming_convention() {
        let persister = ArtifactPersister::new("/out");
        assert_eq!(
            persister.directory(&key(ArtifactType::MultiFile, 42)),
            PathBuf::from("/out/multi_file_42")
        );
        assert_eq!(
            persister.directory(&key(ArtifactType::Scaffold, 7)),
            PathBuf::from("/out/scaffold_7")
        );
    }

    #[test]
    fn save_writes_nested_files() {
        let tmp = TempDir::new().unwrap();
        let persister = ArtifactPersister::new(tmp.path());
        let k = key(ArtifactType::MultiFile, 1);

        let result = persister
            .save(&artifact(&[("index.html", "<h1>x</h1>"), ("js/app.js", "go();")]), &k)
            .unwrap();

        assert_eq!(result.directory, tmp.path().join("multi_file_1"));
        assert_eq!(result.written, vec![p("index.html"), p("js/app.js")]);
        assert_eq!(
            snapshot(&result.directory),
            vec![
                ("index.html".to_string(), "<h1>x</h1>".to_string()),
                ("js/app.js".to_string(), "go();".to_string()),
            ]
        );
        assert!(persister.exists(&k));
    }

    #[test]
    fn saving_twice_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let persister = ArtifactPersister::new(tmp.path());
        let k = key(ArtifactType::MultiFile, 9);
        let a = artifact(&[("a.js", "one\n"), ("css/b.css", "body{}\n")]);

        let dir = persister.save(&a, &k).unwrap().directory;
        let first = snapshot(&dir);
        persister.save(&a, &k).unwrap();
        assert_eq!(snapshot(&dir), first);
    }

    #[test]
    fn blank_content_never_clobbers() {
        let tmp = TempDir::new().unwrap();
        let persister = ArtifactPersister::new(tmp.path());
        let k = key(ArtifactType::MultiFile, 2);

        persister.save(&artifact(&[("a.js", "good")]), &k).unwrap();
        let result = persister
            .save(&artifact(&[("a.js", "  \n"), ("b.js", "new")]), &k)
            .unwrap();

        assert_eq!(result.skipped, vec![p("a.js")]);
        assert_eq!(fs::read_to_string(result.directory.join("a.js")).unwrap(), "good");
        assert_eq!(fs::read_to_string(result.directory.join("b.js")).unwrap(), "new");
    }

    #[test]
    fn files_not_named_are_left_in_place() {
        let tmp = TempDir::new().unwrap();
        let persister = ArtifactPersister::new(tmp.path());
        let k = key(ArtifactType::MultiFile, 3);

        persister.save(&artifact(&[("old.js", "keep")]), &k).unwrap();
        let dir = persister.save(&artifact(&[("new.js", "add")]), &k).unwrap().directory;

        assert_eq!(fs::read_to_string(dir.join("old.js")).unwrap(), "keep");
        assert_eq!(fs::read_to_string(dir.join("new.js")).unwrap(), "add");
    }

    #[test]
    fn empty_artifact_is_rejected_before_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let persister = ArtifactPersister::new(tmp.path());
        let k = key(ArtifactType::SingleFile, 5);

        let err = persister.save(&ParsedArtifact::new(), &k).unwrap_err();
        assert!(matches!(err, PersistError::EmptyArtifact));
        assert!(!persister.exists(&k));
    }

    #[test]
    fn prepare_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let persister = ArtifactPersister::new(tmp.path().join("nested/root"));
        let k = key(ArtifactType::Scaffold, 11);

        let dir = persister.prepare(&k).unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("scaffold_11"));
    }

    #[test]
    fn write_atomic_leaves_no_temporaries() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("deep/file.txt");

        write_atomic(&target, b"v1").unwrap();
        write_atomic(&target, b"v2").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"v2");
        let names: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["file.txt".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn written_files_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("index.html");
        write_atomic(&target, b"<p>").unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
