//! Testing utilities for the Forge workspace
//!
//! Scripted models, recording builders and history doubles shared by the
//! integration tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use forge_artifact::{ArtifactType, SubjectId};
use forge_core::{
    ChatHistoryStore, ChatRole, ChatTurn, EventStream, GenerationRequest, HistoryError,
    InMemoryChatHistory, ModelBinding, ModelError, ModelProvider, StreamEvent,
};
use forge_output::{BuildResult, ProjectBuild, ScaffoldToolbox};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub fn subject(id: i64) -> SubjectId {
    SubjectId::new(id).unwrap()
}

/// JSON arguments for `writeFile`
pub fn write_file_args(path: &str, content: &str) -> String {
    serde_json::json!({ "relativeFilePath": path, "content": content }).to_string()
}

/// One step of a scripted model response
#[derive(Debug, Clone)]
pub enum Step {
    /// Emit a text delta
    Text(String),
    /// Request a tool (arguments split across two fragments), run it through
    /// the request's toolbox and report the result
    Tool { name: String, arguments: String },
    /// Sleep before the next step
    Pause(Duration),
    /// Wait until the notify fires
    Gate(Arc<Notify>),
    /// Emit `StreamCompleted` with the text so far
    Complete,
    /// Emit `StreamFailed`
    Fail(String),
}

impl Step {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn write_file(path: &str, content: &str) -> Self {
        Self::Tool {
            name: "writeFile".to_string(),
            arguments: write_file_args(path, content),
        }
    }
}

/// Model that replays a fixed script and records every request
#[derive(Debug)]
pub struct ScriptedModel {
    steps: Vec<Step>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Text deltas followed by completion
    pub fn text_response(chunks: &[&str]) -> Arc<Self> {
        let mut steps: Vec<Step> = chunks.iter().map(|c| Step::text(c)).collect();
        steps.push(Step::Complete);
        Self::new(steps)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelBinding for ScriptedModel {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError> {
        self.requests.lock().push(request);
        let mut text = String::new();
        for step in &self.steps {
            match step {
                Step::Text(t) => text.push_str(t),
                Step::Fail(e) => return Err(ModelError::Unavailable(e.clone())),
                Step::Pause(d) => tokio::time::sleep(*d).await,
                Step::Gate(n) => n.notified().await,
                Step::Tool { .. } | Step::Complete => {}
            }
        }
        Ok(text)
    }

    async fn stream(&self, request: GenerationRequest) -> Result<EventStream, ModelError> {
        let replay = Replay {
            steps: self.steps.iter().cloned().collect(),
            pending: VecDeque::new(),
            toolbox: request.toolbox.clone(),
            text: String::new(),
            tool_index: 0,
        };
        self.requests.lock().push(request);
        Ok(futures::stream::unfold(replay, Replay::next).boxed())
    }
}

struct Replay {
    steps: VecDeque<Step>,
    pending: VecDeque<StreamEvent>,
    toolbox: Option<ScaffoldToolbox>,
    text: String,
    tool_index: usize,
}

impl Replay {
    async fn next(mut self) -> Option<(StreamEvent, Self)> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some((event, self));
            }
            match self.steps.pop_front()? {
                Step::Text(text) => {
                    self.text.push_str(&text);
                    self.pending.push_back(StreamEvent::text(text));
                }
                Step::Tool { name, arguments } => {
                    let mut split = arguments.len() / 2;
                    while !arguments.is_char_boundary(split) {
                        split -= 1;
                    }
                    for fragment in [&arguments[..split], &arguments[split..]] {
                        self.pending.push_back(StreamEvent::ToolCallRequested {
                            index: self.tool_index,
                            name: name.clone(),
                            args_fragment: fragment.to_string(),
                        });
                    }
                    let result = match &self.toolbox {
                        Some(toolbox) => toolbox.execute(&name, &arguments),
                        None => "Error: no toolbox bound".to_string(),
                    };
                    self.pending
                        .push_back(StreamEvent::ToolCallCompleted { name, result });
                    self.tool_index += 1;
                }
                Step::Pause(duration) => tokio::time::sleep(duration).await,
                Step::Gate(notify) => notify.notified().await,
                Step::Complete => self
                    .pending
                    .push_back(StreamEvent::completed(self.text.clone())),
                Step::Fail(error) => self.pending.push_back(StreamEvent::failed(error)),
            }
        }
    }
}

/// Provider handing out one scripted model and counting binds
#[derive(Debug)]
pub struct ScriptedProvider {
    model: Arc<ScriptedModel>,
    binds: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(model: Arc<ScriptedModel>) -> Arc<Self> {
        Arc::new(Self {
            model,
            binds: AtomicUsize::new(0),
        })
    }

    pub fn model(&self) -> &Arc<ScriptedModel> {
        &self.model
    }

    pub fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }
}

impl ModelProvider for ScriptedProvider {
    fn bind(
        &self,
        _subject: SubjectId,
        _kind: ArtifactType,
    ) -> Result<Arc<dyn ModelBinding>, ModelError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.model) as Arc<dyn ModelBinding>)
    }
}

/// Builder that records every call instead of running commands
#[derive(Debug, Default)]
pub struct RecordingBuilder {
    calls: Mutex<Vec<PathBuf>>,
    result: Option<BuildResult>,
    called: Notify,
}

impl RecordingBuilder {
    /// Reports success with `<dir>/dist`
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reports `result` for every call
    pub fn returning(result: BuildResult) -> Arc<Self> {
        Arc::new(Self {
            result: Some(result),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().clone()
    }

    /// Wait until at least `count` builds were requested
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> Vec<PathBuf> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.called.notified();
            let calls = self.calls();
            if calls.len() >= count {
                return calls;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.calls();
            }
        }
    }
}

#[async_trait]
impl ProjectBuild for RecordingBuilder {
    async fn build(&self, project_dir: &Path) -> BuildResult {
        self.calls.lock().push(project_dir.to_path_buf());
        self.called.notify_waiters();
        self.result.clone().unwrap_or_else(|| BuildResult::Success {
            output_directory: project_dir.join("dist"),
        })
    }
}

/// In-memory history that counts loads and can slow them down
#[derive(Debug, Default)]
pub struct CountingHistory {
    inner: InMemoryChatHistory,
    loads: AtomicUsize,
    load_delay: Option<Duration>,
}

impl CountingHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_load_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            load_delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn turns(&self, subject: SubjectId) -> Vec<ChatTurn> {
        self.inner.all(subject)
    }

    pub fn seed(&self, subject: SubjectId, turns: impl IntoIterator<Item = ChatTurn>) {
        self.inner.seed(subject, turns);
    }
}

#[async_trait]
impl ChatHistoryStore for CountingHistory {
    async fn load_recent(
        &self,
        subject: SubjectId,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, HistoryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.load_recent(subject, limit).await
    }

    async fn append(
        &self,
        subject: SubjectId,
        role: ChatRole,
        text: &str,
    ) -> Result<(), HistoryError> {
        self.inner.append(subject, role, text).await
    }
}

/// In-memory history that parks every model reply until released
#[derive(Debug, Default)]
pub struct GatedHistory {
    inner: InMemoryChatHistory,
    reached: Notify,
    release: Notify,
}

impl GatedHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until a reply append is parked
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let one parked append through
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn turns(&self, subject: SubjectId) -> Vec<ChatTurn> {
        self.inner.all(subject)
    }
}

#[async_trait]
impl ChatHistoryStore for GatedHistory {
    async fn load_recent(
        &self,
        subject: SubjectId,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, HistoryError> {
        self.inner.load_recent(subject, limit).await
    }

    async fn append(
        &self,
        subject: SubjectId,
        role: ChatRole,
        text: &str,
    ) -> Result<(), HistoryError> {
        if role == ChatRole::Ai {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.append(subject, role, text).await
    }
}

/// History store whose every call fails
#[derive(Debug, Default)]
pub struct FailingHistory {
    loads: AtomicUsize,
}

impl FailingHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatHistoryStore for FailingHistory {
    async fn load_recent(
        &self,
        _subject: SubjectId,
        _limit: usize,
    ) -> Result<Vec<ChatTurn>, HistoryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Err(HistoryError::Unavailable("history offline".to_string()))
    }

    async fn append(
        &self,
        _subject: SubjectId,
        _role: ChatRole,
        _text: &str,
    ) -> Result<(), HistoryError> {
        Err(HistoryError::Unavailable("history offline".to_string()))
    }
}

/// Sorted relative paths of every file under `dir`
pub fn list_files(dir: &Path) -> Vec<String> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, out);
            } else if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}
