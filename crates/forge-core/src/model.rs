//! Model binding seam
//!
//! A [`ModelProvider`] binds a `(subject, type)` pair to a [`ModelBinding`]
//! once per session. The binding answers either with a whole response or with
//! a stream of [`StreamEvent`]s.

use crate::error::ModelError;
use crate::history::ChatTurn;
use async_trait::async_trait;
use forge_artifact::{ArtifactType, SubjectId};
use forge_output::ScaffoldToolbox;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Event produced by a streaming model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next piece of response text
    TextDelta { text: String },
    /// Agent asked for a tool; `args_fragment` may be partial JSON
    ToolCallRequested {
        index: usize,
        name: String,
        args_fragment: String,
    },
    /// Tool ran and produced `result`
    ToolCallCompleted { name: String, result: String },
    /// Response finished
    StreamCompleted { final_text: String },
    /// Response aborted
    StreamFailed { error: String },
}

impl StreamEvent {
    /// Text delta
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    /// Completion with the full text
    pub fn completed(final_text: impl Into<String>) -> Self {
        Self::StreamCompleted {
            final_text: final_text.into(),
        }
    }

    /// Failure
    pub fn failed(error: impl Into<String>) -> Self {
        Self::StreamFailed {
            error: error.into(),
        }
    }

    /// Whether this event ends the stream
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamCompleted { .. } | Self::StreamFailed { .. })
    }
}

/// Stream returned by [`ModelBinding::stream`]
pub type EventStream = BoxStream<'static, StreamEvent>;

/// One model call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub subject: SubjectId,
    pub kind: ArtifactType,
    /// Current user prompt
    pub prompt: String,
    /// Session memory before this prompt, oldest first
    pub history: Vec<ChatTurn>,
    /// Tools for scaffold generations, rooted at the project directory
    pub toolbox: Option<ScaffoldToolbox>,
}

/// Model bound to one session
#[async_trait]
pub trait ModelBinding: Send + Sync {
    /// Whole response in one call
    async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError>;

    /// Response as events
    ///
    /// Tool calls are executed by the binding through `request.toolbox` and
    /// reported as [`StreamEvent::ToolCallCompleted`].
    async fn stream(&self, request: GenerationRequest) -> Result<EventStream, ModelError>;
}

/// Factory for per-session bindings
pub trait ModelProvider: Send + Sync {
    /// Bind a model for `(subject, kind)`
    ///
    /// # Errors
    /// [`ModelError`] if no model can serve the pair.
    fn bind(
        &self,
        subject: SubjectId,
        kind: ArtifactType,
    ) -> Result<Arc<dyn ModelBinding>, ModelError>;
}
