//! Model provider that replays a recorded response
//!
//! Lets the pipeline run offline: the response text is streamed back line by
//! line, as a real model would deliver it in deltas.

use async_trait::async_trait;
use forge_core::{
    ArtifactType, EventStream, GenerationRequest, ModelBinding, ModelError, ModelProvider,
    StreamEvent, SubjectId,
};
use futures::StreamExt;
use std::sync::Arc;

/// Binds every session to the same recorded response
#[derive(Debug, Clone)]
pub(crate) struct ReplayProvider {
    model: Arc<ReplayModel>,
}

impl ReplayProvider {
    pub(crate) fn new(response: impl Into<String>) -> Self {
        Self {
            model: Arc::new(ReplayModel {
                response: response.into(),
            }),
        }
    }
}

impl ModelProvider for ReplayProvider {
    fn bind(
        &self,
        subject: SubjectId,
        kind: ArtifactType,
    ) -> Result<Arc<dyn ModelBinding>, ModelError> {
        tracing::debug!(subject = %subject, kind = %kind, "binding replay model");
        Ok(Arc::clone(&self.model) as Arc<dyn ModelBinding>)
    }
}

#[derive(Debug)]
struct ReplayModel {
    response: String,
}

#[async_trait]
impl ModelBinding for ReplayModel {
    async fn generate(&self, _request: GenerationRequest) -> Result<String, ModelError> {
        Ok(self.response.clone())
    }

    async fn stream(&self, _request: GenerationRequest) -> Result<EventStream, ModelError> {
        let mut events: Vec<StreamEvent> = self
            .response
            .split_inclusive('\n')
            .map(StreamEvent::text)
            .collect();
        events.push(StreamEvent::completed(self.response.clone()));
        Ok(futures::stream::iter(events).boxed())
    }
}
