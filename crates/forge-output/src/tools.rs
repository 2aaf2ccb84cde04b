//! Scaffold tool set
//!
//! File tools an agent calls while populating a scaffold project. Every path
//! is an [`ArtifactPath`] resolved under the project root, so no call can
//! reach outside it. Results, including errors, are plain text handed back to
//! the agent.

use crate::error::ToolError;
use crate::persister::write_atomic;
use forge_artifact::ArtifactPath;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};

/// Files the agent may not delete
pub const PROTECTED_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "vite.config.js",
    "vite.config.ts",
    "index.html",
    "src/main.js",
    "src/main.ts",
    "src/App.vue",
];

/// Directory names hidden from listings
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "target",
    "coverage",
    ".idea",
    ".vscode",
    ".cache",
];

/// File names and extensions hidden from listings
const IGNORED_FILES: &[&str] = &[".DS_Store", ".env"];
const IGNORED_EXTENSIONS: &[&str] = &["log", "tmp", "cache"];

const EXIT_ACK: &str =
    "Project complete. Do not call any more tools; reply with a short summary.";

/// Tools available to a scaffold agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaffoldTool {
    WriteFile,
    ReadFile,
    ModifyFile,
    DeleteFile,
    ReadDir,
    Exit,
}

impl ScaffoldTool {
    /// All tools
    pub const ALL: [Self; 6] = [
        Self::WriteFile,
        Self::ReadFile,
        Self::ModifyFile,
        Self::DeleteFile,
        Self::ReadDir,
        Self::Exit,
    ];

    /// Name the agent calls the tool by
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WriteFile => "writeFile",
            Self::ReadFile => "readFile",
            Self::ModifyFile => "modifyFile",
            Self::DeleteFile => "deleteFile",
            Self::ReadDir => "readDir",
            Self::Exit => "exit",
        }
    }

    /// Description offered to the agent
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::WriteFile => {
                "Create or overwrite a file. Arguments: relativeFilePath, content."
            }
            Self::ReadFile => "Read a file. Arguments: relativeFilePath.",
            Self::ModifyFile => {
                "Replace oldContent with newContent in a file. Arguments: relativeFilePath, oldContent, newContent."
            }
            Self::DeleteFile => {
                "Delete a file. Core project files cannot be deleted. Arguments: relativeFilePath."
            }
            Self::ReadDir => {
                "List the project tree. Arguments: relativeDirPath (optional, defaults to the project root)."
            }
            Self::Exit => "Call once the project is complete; stop calling tools afterwards.",
        }
    }

    /// Look up a tool by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

impl Display for ScaffoldTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileArgs {
    relative_file_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteFileArgs {
    relative_file_path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModifyFileArgs {
    relative_file_path: String,
    old_content: String,
    new_content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirArgs {
    #[serde(default)]
    relative_dir_path: Option<String>,
}

/// Tool executor bound to one project directory
#[derive(Debug, Clone)]
pub struct ScaffoldToolbox {
    root: PathBuf,
}

impl ScaffoldToolbox {
    /// Create toolbox for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute a tool call and render its result as text
    ///
    /// `arguments` is the JSON object sent by the agent. Failures come back
    /// as `Error: ...` so the agent can correct itself.
    #[must_use]
    pub fn execute(&self, name: &str, arguments: &str) -> String {
        match self.try_execute(name, arguments) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(tool = name, error = %e, "tool call failed");
                format!("Error: {e}")
            }
        }
    }

    /// Execute a tool call
    ///
    /// # Errors
    /// [`ToolError`] for unknown tools, malformed arguments, invalid paths,
    /// refused deletions and IO failures.
    pub fn try_execute(&self, name: &str, arguments: &str) -> Result<String, ToolError> {
        let tool = ScaffoldTool::from_name(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        match tool {
            ScaffoldTool::WriteFile => self.write_file(parse_args(tool, arguments)?),
            ScaffoldTool::ReadFile => self.read_file(parse_args(tool, arguments)?),
            ScaffoldTool::ModifyFile => self.modify_file(parse_args(tool, arguments)?),
            ScaffoldTool::DeleteFile => self.delete_file(parse_args(tool, arguments)?),
            ScaffoldTool::ReadDir => {
                let args = if arguments.trim().is_empty() {
                    DirArgs::default()
                } else {
                    parse_args(tool, arguments)?
                };
                self.read_dir(args)
            }
            ScaffoldTool::Exit => Ok(EXIT_ACK.to_string()),
        }
    }

    fn write_file(&self, args: WriteFileArgs) -> Result<String, ToolError> {
        let (path, target) = self.resolve(&args.relative_file_path)?;
        write_atomic(&target, args.content.as_bytes())?;
        tracing::debug!(path = %path, bytes = args.content.len(), "tool wrote file");
        Ok(format!("File written: {path}"))
    }

    fn read_file(&self, args: FileArgs) -> Result<String, ToolError> {
        let (path, target) = self.resolve(&args.relative_file_path)?;
        if !target.is_file() {
            return Err(ToolError::NotFound(path.to_string()));
        }
        fs::read_to_string(&target).map_err(|e| ToolError::io_error(&target, e))
    }

    fn modify_file(&self, args: ModifyFileArgs) -> Result<String, ToolError> {
        let (path, target) = self.resolve(&args.relative_file_path)?;
        if !target.is_file() {
            return Err(ToolError::NotFound(path.to_string()));
        }
        let current = fs::read_to_string(&target).map_err(|e| ToolError::io_error(&target, e))?;
        if args.old_content.is_empty() || !current.contains(&args.old_content) {
            return Ok(format!(
                "Warning: original content not found in {path}, file unchanged"
            ));
        }
        let updated = current.replace(&args.old_content, &args.new_content);
        write_atomic(&target, updated.as_bytes())?;
        Ok(format!("File modified: {path}"))
    }

    fn delete_file(&self, args: FileArgs) -> Result<String, ToolError> {
        let (path, target) = self.resolve(&args.relative_file_path)?;
        if PROTECTED_FILES.contains(&path.as_slash_path().as_str()) {
            return Err(ToolError::Refused(format!(
                "{path} is a core project file and cannot be deleted"
            )));
        }
        if !target.is_file() {
            return Ok(format!("Warning: file not found: {path}"));
        }
        fs::remove_file(&target).map_err(|e| ToolError::io_error(&target, e))?;
        Ok(format!("File deleted: {path}"))
    }

    fn read_dir(&self, args: DirArgs) -> Result<String, ToolError> {
        let (label, dir) = match args.relative_dir_path.as_deref().map(str::trim) {
            None | Some("" | "." | "/") => (".".to_string(), self.root.clone()),
            Some(raw) => {
                let (path, dir) = self.resolve(raw)?;
                (path.to_string(), dir)
            }
        };
        let mut out = format!("{label}/\n");
        // Nothing written yet
        if dir == self.root && !dir.exists() {
            return Ok(out);
        }
        if !dir.is_dir() {
            return Err(ToolError::NotFound(label));
        }

        list_tree(&dir, 1, &mut out)?;
        Ok(out)
    }

    fn resolve(&self, raw: &str) -> Result<(ArtifactPath, PathBuf), ToolError> {
        let path: ArtifactPath = raw.parse()?;
        let target = path.resolve(&self.root);
        Ok((path, target))
    }
}

fn parse_args<T: DeserializeOwned>(tool: ScaffoldTool, arguments: &str) -> Result<T, ToolError> {
    serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.name().to_string(),
        message: e.to_string(),
    })
}

fn is_ignored(name: &str, is_dir: bool) -> bool {
    if is_dir {
        return IGNORED_DIRS.contains(&name);
    }
    IGNORED_FILES.contains(&name)
        || Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IGNORED_EXTENSIONS.contains(&ext))
}

fn list_tree(dir: &Path, depth: usize, out: &mut String) -> Result<(), ToolError> {
    let mut entries: Vec<(String, bool, PathBuf)> = fs::read_dir(dir)
        .map_err(|e| ToolError::io_error(dir, e))?
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            let is_dir = path.is_dir();
            (entry.file_name().to_string_lossy().into_owned(), is_dir, path)
        })
        .filter(|(name, is_dir, _)| !is_ignored(name, *is_dir))
        .collect();

    // Directories first, then by name
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let indent = "  ".repeat(depth);
    for (name, is_dir, path) in entries {
        if is_dir {
            out.push_str(&format!("{indent}{name}/\n"));
            list_tree(&path, depth + 1, out)?;
        } else {
            out.push_str(&format!("{indent}{name}\n"));
        }
    }
    Ok(())
}
