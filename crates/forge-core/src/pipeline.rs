//! Generation pipeline
//!
//! Orchestrates one generation end to end:
//! - Text types: session → model → parse → persist
//! - Scaffold: session → agent with tools → directory → build dispatch
//!
//! Blocking calls return a [`GeneratedArtifact`]; streaming calls return a
//! [`GenerationStream`] of [`OutwardEvent`]s that ends with one `done` or
//! `error` unless the consumer abandons it.

use crate::accumulator::{Accumulated, StreamAccumulator};
use crate::cache::GenerationSessionCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{LateFailurePolicy, PipelineConfig};
use crate::dispatch::{BuildDispatcher, BuildHandle};
use crate::error::PipelineError;
use crate::events::OutwardEvent;
use crate::history::{ChatHistoryStore, ChatRole, ChatTurn, InMemoryChatHistory};
use crate::model::{EventStream, GenerationRequest, ModelProvider};
use crate::session::GenerationSession;
use crate::translator::{AgentEventTranslator, Translation};
use forge_artifact::{ArtifactKey, ArtifactType, ParsedArtifact, SubjectId};
use forge_output::{ArtifactPersister, ProjectBuild, ProjectBuilder, ScaffoldToolbox};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use ulid::Ulid;

/// Identifier of one generation, recorded on its tracing span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationId(Ulid);

impl GenerationId {
    /// Fresh id
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a blocking generation
#[derive(Debug)]
pub struct GeneratedArtifact {
    pub id: GenerationId,
    pub key: ArtifactKey,
    /// Artifact directory
    pub directory: PathBuf,
    /// Parsed files (text types only)
    pub artifact: Option<ParsedArtifact>,
    /// Dispatched build (scaffold only)
    pub build: Option<BuildHandle>,
}

/// How a streaming generation ended on the producer side
#[derive(Debug)]
pub enum StreamOutcome {
    /// Stream completed; `directory` is `None` if persistence failed late
    Completed {
        directory: Option<PathBuf>,
        build: Option<BuildHandle>,
    },
    /// Generation failed with this message
    Failed(String),
    /// Consumer went away before completion
    Cancelled,
}

impl StreamOutcome {
    /// Whether the stream completed
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Outward event stream of one generation
///
/// Dropping it (or calling [`cancel`](Self::cancel)) stops delivery. Work
/// already past completion, such as persistence, still finishes.
#[derive(Debug)]
pub struct GenerationStream {
    id: GenerationId,
    key: ArtifactKey,
    rx: mpsc::Receiver<OutwardEvent>,
    task: JoinHandle<StreamOutcome>,
}

impl GenerationStream {
    /// Generation id
    #[must_use]
    pub fn id(&self) -> GenerationId {
        self.id
    }

    /// Generation key
    #[must_use]
    pub fn key(&self) -> ArtifactKey {
        self.key
    }

    /// Next event, `None` once the producer is done
    pub async fn recv(&mut self) -> Option<OutwardEvent> {
        self.rx.recv().await
    }

    /// Stop receiving events
    ///
    /// Returns the producer task so the caller may observe how it wound down.
    pub fn cancel(mut self) -> JoinHandle<StreamOutcome> {
        self.rx.close();
        tracing::debug!(id = %self.id, "generation stream cancelled by consumer");
        self.task
    }

    /// Drain remaining events and wait for the producer
    pub async fn finish(self) -> StreamOutcome {
        self.collect_all().await.1
    }

    /// Every remaining event plus the producer outcome
    pub async fn collect_all(mut self) -> (Vec<OutwardEvent>, StreamOutcome) {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        let outcome = match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => StreamOutcome::Failed(format!("generation task aborted: {e}")),
        };
        (events, outcome)
    }
}

impl Stream for GenerationStream {
    type Item = OutwardEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Assembles a [`Pipeline`]
pub struct PipelineBuilder {
    config: PipelineConfig,
    provider: Option<Arc<dyn ModelProvider>>,
    history: Option<Arc<dyn ChatHistoryStore>>,
    project_builder: Option<Arc<dyn ProjectBuild>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PipelineBuilder {
    /// Model provider (required)
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Chat history store (defaults to in-memory)
    #[must_use]
    pub fn history(mut self, history: Arc<dyn ChatHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Project builder (defaults to [`ProjectBuilder`] with the build config)
    #[must_use]
    pub fn project_builder(mut self, builder: Arc<dyn ProjectBuild>) -> Self {
        self.project_builder = Some(builder);
        self
    }

    /// Clock for session expiry (defaults to the system clock)
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the pipeline
    ///
    /// # Errors
    /// [`PipelineError::InvalidArgument`] for a bad config or missing provider.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.config
            .validate()
            .map_err(|e| PipelineError::InvalidArgument(e.to_string()))?;
        let provider = self
            .provider
            .ok_or_else(|| PipelineError::InvalidArgument("model provider is required".into()))?;

        let history: Arc<dyn ChatHistoryStore> = match self.history {
            Some(history) => history,
            None => Arc::new(InMemoryChatHistory::new()),
        };
        let project_builder: Arc<dyn ProjectBuild> = match self.project_builder {
            Some(builder) => builder,
            None => Arc::new(ProjectBuilder::new(self.config.build.clone())),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let sessions =
            GenerationSessionCache::new(self.config.cache, provider, Arc::clone(&history), clock);
        let persister = ArtifactPersister::new(self.config.output.root_dir.clone());

        Ok(Pipeline {
            inner: Arc::new(Inner {
                config: self.config,
                sessions,
                history,
                persister,
                builds: BuildDispatcher::new(project_builder),
            }),
        })
    }
}

/// Generation-to-artifact pipeline
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    sessions: GenerationSessionCache,
    history: Arc<dyn ChatHistoryStore>,
    persister: ArtifactPersister,
    builds: BuildDispatcher,
}

impl Pipeline {
    /// Start assembling a pipeline
    #[must_use]
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            provider: None,
            history: None,
            project_builder: None,
            clock: None,
        }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Session cache
    #[must_use]
    pub fn sessions(&self) -> &GenerationSessionCache {
        &self.inner.sessions
    }

    /// Artifact persister
    #[must_use]
    pub fn persister(&self) -> &ArtifactPersister {
        &self.inner.persister
    }

    /// Generate and persist, returning once the artifact is on disk
    ///
    /// For scaffold generations this returns once the build is dispatched.
    ///
    /// # Errors
    /// [`PipelineError`] for invalid input, model failure, empty artifacts
    /// and persistence failure.
    pub async fn generate(
        &self,
        subject: SubjectId,
        kind: ArtifactType,
        prompt: &str,
    ) -> Result<GeneratedArtifact, PipelineError> {
        check_prompt(prompt)?;
        let id = GenerationId::new();
        let key = ArtifactKey::new(kind, subject);
        let span = tracing::info_span!("generation", id = %id, key = %key, streaming = false);
        self.inner.generate(id, key, prompt).instrument(span).await
    }

    /// Generate while streaming events to the caller
    ///
    /// Input is checked before anything starts; later failures arrive as an
    /// `error` event.
    ///
    /// # Errors
    /// [`PipelineError::InvalidArgument`] for a blank prompt.
    pub fn generate_streaming(
        &self,
        subject: SubjectId,
        kind: ArtifactType,
        prompt: &str,
    ) -> Result<GenerationStream, PipelineError> {
        check_prompt(prompt)?;
        let id = GenerationId::new();
        let key = ArtifactKey::new(kind, subject);
        let (tx, rx) = mpsc::channel(self.inner.config.stream.event_buffer);

        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_owned();
        let span = tracing::info_span!("generation", id = %id, key = %key, streaming = true);
        let task = tokio::spawn(async move { inner.run_stream(key, prompt, tx).await }.instrument(span));

        Ok(GenerationStream { id, key, rx, task })
    }

    /// [`generate`](Self::generate) for unvalidated caller input
    ///
    /// # Errors
    /// See [`validate_request`].
    pub async fn generate_raw(
        &self,
        subject: i64,
        kind: Option<&str>,
        prompt: &str,
    ) -> Result<GeneratedArtifact, PipelineError> {
        let (subject, kind) = validate_request(subject, kind, prompt)?;
        self.generate(subject, kind, prompt).await
    }

    /// [`generate_streaming`](Self::generate_streaming) for unvalidated caller input
    ///
    /// # Errors
    /// See [`validate_request`].
    pub fn generate_streaming_raw(
        &self,
        subject: i64,
        kind: Option<&str>,
        prompt: &str,
    ) -> Result<GenerationStream, PipelineError> {
        let (subject, kind) = validate_request(subject, kind, prompt)?;
        self.generate_streaming(subject, kind, prompt)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.inner.config)
            .field("sessions", &self.inner.sessions)
            .finish_non_exhaustive()
    }
}

/// Check raw caller input
///
/// # Errors
/// - [`PipelineError::InvalidArgument`] for a missing type, non-positive
///   subject or blank prompt
/// - [`PipelineError::UnsupportedArtifactType`] for an unknown type value
pub fn validate_request(
    subject: i64,
    kind: Option<&str>,
    prompt: &str,
) -> Result<(SubjectId, ArtifactType), PipelineError> {
    let kind = kind
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| PipelineError::InvalidArgument("artifact type is required".into()))?;
    let subject = SubjectId::new(subject)?;
    check_prompt(prompt)?;
    let kind = ArtifactType::from_value(kind)?;
    Ok((subject, kind))
}

fn check_prompt(prompt: &str) -> Result<(), PipelineError> {
    if prompt.trim().is_empty() {
        return Err(PipelineError::InvalidArgument("prompt must not be blank".into()));
    }
    Ok(())
}

impl Inner {
    async fn generate(
        &self,
        id: GenerationId,
        key: ArtifactKey,
        prompt: &str,
    ) -> Result<GeneratedArtifact, PipelineError> {
        self.record(key.subject, ChatRole::User, prompt).await;

        // Created by the first tool write, or on completion
        let project_dir = key
            .kind
            .is_tool_driven()
            .then(|| self.persister.directory(&key));

        let session = self.sessions.get(key.subject, key.kind).await?;
        let _guard = session.begin().await;
        let request = begin_request(&session, prompt, project_dir.as_deref());

        match project_dir {
            None => {
                let text = match session.binding().generate(request).await {
                    Ok(text) => text,
                    Err(e) => {
                        self.remember_failure(&session, &e.to_string()).await;
                        return Err(e.into());
                    }
                };
                self.remember_reply(&session, &text).await;

                let artifact = key.kind.parse(&text)?;
                let persisted = self.persister.save(&artifact, &key)?;
                tracing::info!(files = artifact.len(), "generation persisted");
                Ok(GeneratedArtifact {
                    id,
                    key,
                    directory: persisted.directory,
                    artifact: Some(artifact),
                    build: None,
                })
            }
            Some(directory) => {
                let mut events = match session.binding().stream(request).await {
                    Ok(events) => events,
                    Err(e) => {
                        self.remember_failure(&session, &e.to_string()).await;
                        return Err(e.into());
                    }
                };

                let mut translator = AgentEventTranslator::new();
                loop {
                    let Some(event) = events.next().await else {
                        let message = "agent stream ended without completion";
                        self.remember_failure(&session, message).await;
                        return Err(PipelineError::StreamFailed(message.into()));
                    };
                    match translator.translate(event) {
                        Translation::Emit(_) | Translation::Dropped => {}
                        Translation::Completed => break,
                        Translation::Failed(error) => {
                            self.remember_failure(&session, &error).await;
                            return Err(PipelineError::StreamFailed(error));
                        }
                    }
                }

                self.remember_reply(&session, &translator.transcript()).await;
                let directory = self.persister.prepare(&key)?;
                let build = self.builds.dispatch(key, directory.clone());
                Ok(GeneratedArtifact {
                    id,
                    key,
                    directory,
                    artifact: None,
                    build: Some(build),
                })
            }
        }
    }

    async fn run_stream(
        &self,
        key: ArtifactKey,
        prompt: String,
        tx: mpsc::Sender<OutwardEvent>,
    ) -> StreamOutcome {
        self.record(key.subject, ChatRole::User, &prompt).await;

        let project_dir = key
            .kind
            .is_tool_driven()
            .then(|| self.persister.directory(&key));

        let session = match self.sessions.get(key.subject, key.kind).await {
            Ok(session) => session,
            Err(e) => return fail_early(&tx, &e).await,
        };
        let _guard = session.begin().await;
        let request = begin_request(&session, &prompt, project_dir.as_deref());

        let events = match session.binding().stream(request).await {
            Ok(events) => events,
            Err(e) => return self.stream_broke(&session, &tx, &PipelineError::from(e).to_string()).await,
        };

        match project_dir {
            None => self.drive_text(&session, events, &tx).await,
            Some(_) => self.drive_agent(&session, events, &tx).await,
        }
    }

    async fn drive_text(
        &self,
        session: &GenerationSession,
        mut events: EventStream,
        tx: &mpsc::Sender<OutwardEvent>,
    ) -> StreamOutcome {
        let mut accumulator = StreamAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                () = tx.closed() => {
                    tracing::info!(
                        buffered = accumulator.buffered().len(),
                        "consumer went away, discarding partial response"
                    );
                    return StreamOutcome::Cancelled;
                }
                next = events.next() => next,
            };
            let Some(event) = next else {
                return self
                    .stream_broke(session, tx, "model stream ended without completion")
                    .await;
            };

            match accumulator.push(event) {
                Accumulated::Forward(event) => {
                    if tx.send(event).await.is_err() {
                        tracing::info!("consumer went away, discarding partial response");
                        return StreamOutcome::Cancelled;
                    }
                }
                Accumulated::Skip => {}
                Accumulated::Failed(error) => return self.stream_broke(session, tx, &error).await,
                Accumulated::Complete(text) => return self.complete_text(session, &text, tx).await,
            }
        }
    }

    async fn complete_text(
        &self,
        session: &GenerationSession,
        text: &str,
        tx: &mpsc::Sender<OutwardEvent>,
    ) -> StreamOutcome {
        self.remember_reply(session, text).await;
        let key = session.key();

        match self.config.stream.late_persistence_failure {
            LateFailurePolicy::Log => {
                if tx.send(OutwardEvent::Done).await.is_err() {
                    tracing::debug!("consumer gone before done, persisting anyway");
                }
                match self.persist_text(key, text) {
                    Ok(directory) => StreamOutcome::Completed {
                        directory: Some(directory),
                        build: None,
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "late persistence failure after done");
                        StreamOutcome::Completed {
                            directory: None,
                            build: None,
                        }
                    }
                }
            }
            LateFailurePolicy::Surface => match self.persist_text(key, text) {
                Ok(directory) => {
                    if tx.send(OutwardEvent::Done).await.is_err() {
                        tracing::debug!("consumer gone before done");
                    }
                    StreamOutcome::Completed {
                        directory: Some(directory),
                        build: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "persistence failed, surfacing error");
                    let message = e.to_string();
                    if tx.send(OutwardEvent::error(message.clone())).await.is_err() {
                        tracing::debug!("consumer gone before error");
                    }
                    StreamOutcome::Failed(message)
                }
            },
        }
    }

    async fn drive_agent(
        &self,
        session: &GenerationSession,
        mut events: EventStream,
        tx: &mpsc::Sender<OutwardEvent>,
    ) -> StreamOutcome {
        let mut translator = AgentEventTranslator::new();
        loop {
            let next = tokio::select! {
                biased;
                () = tx.closed() => {
                    tracing::info!(
                        tools = translator.tools_executed(),
                        "consumer went away, scaffold left unbuilt"
                    );
                    return StreamOutcome::Cancelled;
                }
                next = events.next() => next,
            };
            let Some(event) = next else {
                return self
                    .stream_broke(session, tx, "agent stream ended without completion")
                    .await;
            };

            match translator.translate(event) {
                Translation::Emit(event) => {
                    if tx.send(event).await.is_err() {
                        tracing::info!("consumer went away, scaffold left unbuilt");
                        return StreamOutcome::Cancelled;
                    }
                }
                Translation::Dropped => {}
                Translation::Failed(error) => return self.stream_broke(session, tx, &error).await,
                Translation::Completed => {
                    self.remember_reply(session, &translator.transcript()).await;
                    let directory = match self.persister.prepare(&session.key()) {
                        Ok(directory) => directory,
                        Err(e) => {
                            tracing::warn!(error = %e, "scaffold directory unavailable, skipping build");
                            let message = PipelineError::from(e).to_string();
                            if tx.send(OutwardEvent::error(message.clone())).await.is_err() {
                                tracing::debug!("consumer gone before error");
                            }
                            return StreamOutcome::Failed(message);
                        }
                    };
                    let build = self.builds.dispatch(session.key(), directory.clone());
                    if tx.send(OutwardEvent::Done).await.is_err() {
                        tracing::debug!("consumer gone before done, build continues");
                    }
                    return StreamOutcome::Completed {
                        directory: Some(directory),
                        build: Some(build),
                    };
                }
            }
        }
    }

    async fn stream_broke(
        &self,
        session: &GenerationSession,
        tx: &mpsc::Sender<OutwardEvent>,
        error: &str,
    ) -> StreamOutcome {
        tracing::warn!(error = %error, "generation failed");
        self.remember_failure(session, error).await;
        if tx.send(OutwardEvent::error(error)).await.is_err() {
            tracing::debug!("consumer gone before error");
        }
        StreamOutcome::Failed(error.to_string())
    }

    fn persist_text(&self, key: ArtifactKey, text: &str) -> Result<PathBuf, PipelineError> {
        let artifact = key.kind.parse(text)?;
        let persisted = self.persister.save(&artifact, &key)?;
        Ok(persisted.directory)
    }

    async fn record(&self, subject: SubjectId, role: ChatRole, text: &str) {
        if let Err(e) = self.history.append(subject, role, text).await {
            tracing::warn!(subject = %subject, role = ?role, error = %e, "failed to append chat history");
        }
    }

    async fn remember_reply(&self, session: &GenerationSession, text: &str) {
        session.memory().push(ChatTurn::ai(text));
        self.record(session.key().subject, ChatRole::Ai, text).await;
    }

    async fn remember_failure(&self, session: &GenerationSession, error: &str) {
        self.remember_reply(session, &format!("Generation failed: {error}"))
            .await;
    }
}

/// Build the model request, then add the prompt to session memory
fn begin_request(
    session: &GenerationSession,
    prompt: &str,
    project_dir: Option<&Path>,
) -> GenerationRequest {
    let key = session.key();
    let request = GenerationRequest {
        subject: key.subject,
        kind: key.kind,
        prompt: prompt.to_owned(),
        history: session.memory().snapshot(),
        toolbox: project_dir.map(ScaffoldToolbox::new),
    };
    session.memory().push(ChatTurn::user(prompt));
    request
}

async fn fail_early(tx: &mpsc::Sender<OutwardEvent>, error: &PipelineError) -> StreamOutcome {
    tracing::warn!(error = %error, kind = error.kind(), "generation could not start");
    let message = error.to_string();
    if tx.send(OutwardEvent::error(message.clone())).await.is_err() {
        tracing::debug!("consumer gone before error");
    }
    StreamOutcome::Failed(message)
}
