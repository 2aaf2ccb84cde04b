//! Outward events delivered to the consumer of a streaming generation

use serde::{Deserialize, Serialize};

/// Event on the outward channel
///
/// Serialized with a `type` tag, e.g. `{"type":"ai_response","data":"..."}`.
/// A stream that is not abandoned ends with exactly one `done` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutwardEvent {
    /// Response text, forwarded as it arrives
    AiResponse { data: String },
    /// Agent requested a tool; `arguments` is the raw fragment
    ToolRequest {
        index: usize,
        name: String,
        arguments: String,
    },
    /// Tool finished
    ToolExecuted { name: String, result: String },
    /// Generation finished
    Done,
    /// Generation failed
    Error { message: String },
}

impl OutwardEvent {
    /// Error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event closes the stream
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// JSON encoding for the wire
    ///
    /// # Errors
    /// Only if serde_json fails, which these variants never trigger.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
