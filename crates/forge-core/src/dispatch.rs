//! Background build dispatch
//!
//! Each scaffold build runs on its own task. The outcome is logged and kept
//! in the returned handle; nothing flows back into the response path.

use forge_artifact::ArtifactKey;
use forge_output::{BuildResult, ProjectBuild};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Handle to a dispatched build
#[derive(Debug)]
pub struct BuildHandle {
    key: ArtifactKey,
    task: JoinHandle<BuildResult>,
}

impl BuildHandle {
    /// Key the build belongs to
    #[must_use]
    pub fn key(&self) -> ArtifactKey {
        self.key
    }

    /// Whether the build has finished
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the outcome
    pub async fn wait(self) -> BuildResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => BuildResult::failure(format!("build task aborted: {e}")),
        }
    }
}

/// Spawns builds on the runtime
#[derive(Clone)]
pub struct BuildDispatcher {
    builder: Arc<dyn ProjectBuild>,
}

impl BuildDispatcher {
    /// Create dispatcher
    #[must_use]
    pub fn new(builder: Arc<dyn ProjectBuild>) -> Self {
        Self { builder }
    }

    /// Start a build of `project_dir` without waiting for it
    pub fn dispatch(&self, key: ArtifactKey, project_dir: PathBuf) -> BuildHandle {
        let builder = Arc::clone(&self.builder);
        let span = tracing::info_span!("build", key = %key);

        // The inner task isolates a panicking builder from the supervisor
        let task = tokio::spawn(
            async move {
                let work = tokio::spawn(async move { builder.build(&project_dir).await });
                let result = match work.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(error = %e, "build task panicked");
                        BuildResult::failure(format!("build task panicked: {e}"))
                    }
                };
                match &result {
                    BuildResult::Success { output_directory } => tracing::info!(
                        output = %output_directory.display(),
                        "scaffold build finished"
                    ),
                    BuildResult::Failure { reason } => {
                        tracing::warn!(reason = %reason, "scaffold build failed");
                    }
                }
                result
            }
            .instrument(span),
        );

        tracing::debug!(key = %key, "build dispatched");
        BuildHandle { key, task }
    }
}

impl std::fmt::Debug for BuildDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDispatcher").finish_non_exhaustive()
    }
}
