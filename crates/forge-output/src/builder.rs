//! Project builder
//!
//! Runs the install and build commands of a scaffold project and checks for
//! its output directory. One deadline covers both commands. Each command runs
//! in its own process group, and the group is killed once the command ends or
//! the deadline passes, so no stray process can write output afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};
use tokio::task::JoinHandle;

/// Failure reason reported when the deadline expires
pub const TIMEOUT_REASON: &str = "timeout";

/// Maximum stderr characters carried in a failure reason
const STDERR_TAIL: usize = 500;

/// Bytes of stderr kept while a step runs (UTF-8 is at most 4 bytes a char)
const STDERR_TAIL_BYTES: usize = STDERR_TAIL * 4;

/// How long stderr may stay open after the step's group is gone
const STDERR_DRAIN: Duration = Duration::from_secs(1);

/// Outcome of one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildResult {
    /// Build produced its output directory
    Success { output_directory: PathBuf },
    /// Build did not produce usable output
    Failure { reason: String },
}

impl BuildResult {
    /// Failure with a reason
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    /// Whether the build succeeded
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether the build hit its deadline
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Failure { reason } if reason == TIMEOUT_REASON)
    }
}

/// Commands and limits for project builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Dependency install command (program followed by arguments)
    pub install_command: Vec<String>,
    /// Build command (program followed by arguments)
    pub build_command: Vec<String>,
    /// Manifest that must exist before anything runs
    pub manifest_file: String,
    /// Output directory name, relative to the project
    pub output_dir: String,
    /// Deadline for install plus build, in seconds
    pub timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            install_command: vec!["npm".into(), "install".into()],
            build_command: vec!["npm".into(), "run".into(), "build".into()],
            manifest_file: "package.json".into(),
            output_dir: "dist".into(),
            timeout_secs: 480,
        }
    }
}

impl BuildConfig {
    /// Set install command
    #[must_use]
    pub fn with_install_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set build command
    #[must_use]
    pub fn with_build_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Deadline as a duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Build seam used by the pipeline
#[async_trait]
pub trait ProjectBuild: Send + Sync {
    /// Build the project at `project_dir`
    ///
    /// Never fails: every problem is a [`BuildResult::Failure`].
    async fn build(&self, project_dir: &Path) -> BuildResult;
}

/// Builder that runs external commands
#[derive(Debug, Clone, Default)]
pub struct ProjectBuilder {
    config: BuildConfig,
}

impl ProjectBuilder {
    /// Create builder
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Output directory for a project
    #[must_use]
    pub fn output_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.config.output_dir)
    }

    async fn run_steps(&self, project_dir: &Path) -> Result<PathBuf, String> {
        if !project_dir.is_dir() {
            return Err(format!(
                "project directory not found: {}",
                project_dir.display()
            ));
        }
        if !project_dir.join(&self.config.manifest_file).is_file() {
            return Err(format!("missing {}", self.config.manifest_file));
        }

        let deadline = tokio::time::Instant::now() + self.config.timeout();
        run_step(&self.config.install_command, project_dir, deadline).await?;
        run_step(&self.config.build_command, project_dir, deadline).await?;

        let output = self.output_dir(project_dir);
        if !output.is_dir() {
            return Err(format!(
                "build finished without producing {}",
                self.config.output_dir
            ));
        }
        Ok(output)
    }
}

#[async_trait]
impl ProjectBuild for ProjectBuilder {
    async fn build(&self, project_dir: &Path) -> BuildResult {
        let started = Instant::now();
        let output = self.output_dir(project_dir);
        let output_existed = output.exists();

        tracing::info!(project = %project_dir.display(), "build started");

        let result = match self.run_steps(project_dir).await {
            Ok(output_directory) => BuildResult::Success { output_directory },
            Err(reason) => {
                if !output_existed && output.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&output) {
                        tracing::warn!(
                            output = %output.display(),
                            error = %e,
                            "failed to remove partial build output"
                        );
                    }
                }
                BuildResult::Failure { reason }
            }
        };

        match &result {
            BuildResult::Success { output_directory } => tracing::info!(
                output = %output_directory.display(),
                elapsed_ms = started.elapsed().as_millis(),
                "build succeeded"
            ),
            BuildResult::Failure { reason } => tracing::warn!(
                project = %project_dir.display(),
                reason = %reason,
                elapsed_ms = started.elapsed().as_millis(),
                "build failed"
            ),
        }
        result
    }
}

async fn run_step(
    command: &[String],
    project_dir: &Path,
    deadline: tokio::time::Instant,
) -> Result<(), String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| "empty build command".to_string())?;
    let command_line = command.join(" ");

    let mut cmd = Command::new(resolve_program(program));
    cmd.args(args)
        .current_dir(project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // The step and everything it spawns share one group, killed as a unit
    #[cfg(unix)]
    cmd.process_group(0);

    tracing::debug!(command = %command_line, "running build step");

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("failed to launch `{command_line}`: {e}"))?;
    let group = child.id();
    let stderr = child.stderr.take().map(|pipe| tokio::spawn(read_tail(pipe)));

    let waited = tokio::time::timeout_at(deadline, child.wait()).await;
    kill_group(group);
    if waited.is_err() {
        if let Err(e) = child.kill().await {
            tracing::debug!(command = %command_line, error = %e, "child already gone at deadline");
        }
    }
    let tail = collect_tail(stderr).await;

    match waited {
        Err(_) => {
            tracing::warn!(command = %command_line, "build step hit deadline, process group killed");
            Err(TIMEOUT_REASON.to_string())
        }
        Ok(Err(e)) => Err(format!("failed to wait for `{command_line}`: {e}")),
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(format!("`{command_line}` exited with {status}: {}", stderr_tail(&tail))),
    }
}

/// Kill every process left in a step's group
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, error = %e, "failed to kill build process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

/// Last bytes written to stderr
async fn read_tail(mut pipe: ChildStderr) -> Vec<u8> {
    let mut tail = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
            }
        }
    }
    tail
}

async fn collect_tail(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut reader) = reader else {
        return Vec::new();
    };
    // A process outside the group may still hold the pipe open
    match tokio::time::timeout(STDERR_DRAIN, &mut reader).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            reader.abort();
            Vec::new()
        }
    }
}

/// `npm` is a batch shim on Windows
fn resolve_program(program: &str) -> &str {
    if cfg!(windows) && program == "npm" {
        "npm.cmd"
    } else {
        program
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL {
        return text.to_string();
    }
    text.chars().skip(count - STDERR_TAIL).collect()
}
