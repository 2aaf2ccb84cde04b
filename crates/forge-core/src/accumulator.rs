//! Stream accumulation for text artifacts
//!
//! Forwards text deltas outward while keeping the full response, and reports
//! completion with the text to parse. After a terminal event every further
//! event is ignored.

use crate::events::OutwardEvent;
use crate::model::StreamEvent;

/// What the caller should do with one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulated {
    /// Deliver this event
    Forward(OutwardEvent),
    /// Nothing to deliver
    Skip,
    /// Stream completed; parse and persist this text
    Complete(String),
    /// Stream failed; discard everything
    Failed(String),
}

/// Single-pass consumer of a text stream
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: String,
    deltas: usize,
    finished: bool,
}

impl StreamAccumulator {
    /// Create accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one event
    pub fn push(&mut self, event: StreamEvent) -> Accumulated {
        if self.finished {
            tracing::debug!("ignoring event after terminal event");
            return Accumulated::Skip;
        }

        match event {
            StreamEvent::TextDelta { text } => {
                self.buffer.push_str(&text);
                self.deltas += 1;
                Accumulated::Forward(OutwardEvent::AiResponse { data: text })
            }
            StreamEvent::ToolCallRequested { name, .. }
            | StreamEvent::ToolCallCompleted { name, .. } => {
                tracing::debug!(tool = %name, "ignoring tool event on text stream");
                Accumulated::Skip
            }
            StreamEvent::StreamCompleted { final_text } => {
                self.finished = true;
                let text = if self.deltas == 0 {
                    final_text
                } else {
                    std::mem::take(&mut self.buffer)
                };
                Accumulated::Complete(text)
            }
            StreamEvent::StreamFailed { error } => {
                self.finished = true;
                self.buffer.clear();
                Accumulated::Failed(error)
            }
        }
    }

    /// Text received so far
    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Whether a terminal event was seen
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn forwards_deltas_and_completes_with_buffer() {
        let mut acc = StreamAccumulator::new();

        assert_eq!(
            acc.push(StreamEvent::text("<h1>")),
            Accumulated::Forward(OutwardEvent::AiResponse { data: "<h1>".into() })
        );
        acc.push(StreamEvent::text("Hi</h1>"));
        assert_eq!(acc.buffered(), "<h1>Hi</h1>");

        assert_eq!(
            acc.push(StreamEvent::completed("ignored when deltas arrived")),
            Accumulated::Complete("<h1>Hi</h1>".into())
        );
        assert!(acc.is_finished());
    }

    #[test]
    fn final_text_used_without_deltas() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(
            acc.push(StreamEvent::completed("whole")),
            Accumulated::Complete("whole".into())
        );
    }

    #[test]
    fn failure_discards_buffer() {
        let mut acc = StreamAccumulator::new();
        acc.push(StreamEvent::text("partial"));
        assert_eq!(
            acc.push(StreamEvent::failed("reset")),
            Accumulated::Failed("reset".into())
        );
        assert_eq!(acc.buffered(), "");
    }

    #[test]
    fn events_after_terminal_are_skipped() {
        let mut acc = StreamAccumulator::new();
        acc.push(StreamEvent::completed("x"));
        assert_eq!(acc.push(StreamEvent::text("late")), Accumulated::Skip);
        assert_eq!(acc.push(StreamEvent::failed("late")), Accumulated::Skip);
    }

    #[test]
    fn tool_events_are_ignored() {
        let mut acc = StreamAccumulator::new();
        let skipped = acc.push(StreamEvent::ToolCallRequested {
            index: 0,
            name: "writeFile".into(),
            args_fragment: "{}".into(),
        });
        assert_eq!(skipped, Accumulated::Skip);
        assert_eq!(acc.buffered(), "");
    }
}
