//! Forge Core
//!
//! The generation-to-artifact pipeline.
//!
//! # Architecture
//!
//! ```text
//! prompt ──► Pipeline ──► GenerationSessionCache ──► ModelBinding
//!                │                                       │
//!                │          text types                   │  StreamEvent
//!                ├──► StreamAccumulator ──► parse ──► ArtifactPersister
//!                │
//!                │          scaffold
//!                └──► AgentEventTranslator ──► BuildDispatcher ──► ProjectBuild
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::builder(PipelineConfig::default())
//!     .provider(provider)
//!     .build()?;
//!
//! let mut stream = pipeline.generate_streaming_raw(42, Some("multi_file"), "a landing page")?;
//! while let Some(event) = stream.recv().await {
//!     println!("{}", event.to_json()?);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod accumulator;
mod cache;
mod clock;
mod config;
mod dispatch;
mod error;
mod events;
mod history;
mod memory;
mod model;
mod pipeline;
mod session;
mod translator;

pub use accumulator::{Accumulated, StreamAccumulator};
pub use cache::{CacheStats, GenerationSessionCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, LateFailurePolicy, OutputConfig, PipelineConfig, StreamConfig};
pub use dispatch::{BuildDispatcher, BuildHandle};
pub use error::{ConfigError, HistoryError, ModelError, PipelineError};
pub use events::OutwardEvent;
pub use history::{ChatHistoryStore, ChatRole, ChatTurn, InMemoryChatHistory};
pub use memory::ConversationMemory;
pub use model::{EventStream, GenerationRequest, ModelBinding, ModelProvider, StreamEvent};
pub use pipeline::{
    validate_request, GeneratedArtifact, GenerationId, GenerationStream, Pipeline,
    PipelineBuilder, StreamOutcome,
};
pub use session::{GenerationGuard, GenerationSession};
pub use translator::{AgentEventTranslator, Translation};

// Types callers need alongside the pipeline
pub use forge_artifact::{ArtifactKey, ArtifactType, ParsedArtifact, SubjectId};
pub use forge_output::{BuildConfig, BuildResult, ProjectBuild, ScaffoldToolbox};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
