//! Agent event translation for scaffold generations
//!
//! Maps model events 1:1 onto outward events. Completion carries no event of
//! its own: the pipeline dispatches the build and then sends `done`.

use crate::events::OutwardEvent;
use crate::model::StreamEvent;

/// Result of translating one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Deliver this event
    Emit(OutwardEvent),
    /// Agent finished; dispatch the build, then send `done`
    Completed,
    /// Agent failed with this message; send `error` and close
    Failed(String),
    /// Event arrived after a terminal event
    Dropped,
}

/// Stateful translator for one agent stream
#[derive(Debug, Default)]
pub struct AgentEventTranslator {
    text: String,
    tool_log: Vec<String>,
    terminated: bool,
}

impl AgentEventTranslator {
    /// Create translator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one event
    pub fn translate(&mut self, event: StreamEvent) -> Translation {
        if self.terminated {
            tracing::debug!("dropping agent event after terminal event");
            return Translation::Dropped;
        }

        match event {
            StreamEvent::TextDelta { text } => {
                self.text.push_str(&text);
                Translation::Emit(OutwardEvent::AiResponse { data: text })
            }
            StreamEvent::ToolCallRequested {
                index,
                name,
                args_fragment,
            } => Translation::Emit(OutwardEvent::ToolRequest {
                index,
                name,
                arguments: args_fragment,
            }),
            StreamEvent::ToolCallCompleted { name, result } => {
                self.tool_log.push(format!("[tool] {name}: {result}"));
                Translation::Emit(OutwardEvent::ToolExecuted { name, result })
            }
            StreamEvent::StreamCompleted { final_text } => {
                self.terminated = true;
                if self.text.is_empty() {
                    self.text = final_text;
                }
                Translation::Completed
            }
            StreamEvent::StreamFailed { error } => {
                self.terminated = true;
                Translation::Failed(error)
            }
        }
    }

    /// Reply recorded in history: agent text then one line per executed tool
    #[must_use]
    pub fn transcript(&self) -> String {
        let mut lines = Vec::with_capacity(self.tool_log.len() + 1);
        if !self.text.trim().is_empty() {
            lines.push(self.text.trim_end().to_string());
        }
        lines.extend(self.tool_log.iter().cloned());
        lines.join("\n")
    }

    /// Tools executed so far
    #[must_use]
    pub fn tools_executed(&self) -> usize {
        self.tool_log.len()
    }
}
