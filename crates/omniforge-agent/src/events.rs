//! Task events streamed to callers.
//!
//! Every execution produces an ordered stream that starts with
//! `status(working)` and ends with exactly one `done`.

use std::pin::Pin;

use futures::Stream;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Working,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Working)
    }
}

/// One part of a message event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessagePart {
    Text { text: String },
    Data { data: Value },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// An event emitted during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Status {
        state: TaskState,
    },
    Message {
        parts: Vec<MessagePart>,
        is_partial: bool,
    },
    Error {
        code: String,
        message: String,
    },
    /// Always the last event of a stream.
    Done {
        final_state: TaskState,
    },
}

impl TaskEvent {
    pub fn status(state: TaskState) -> Self {
        Self::Status { state }
    }

    /// A complete text message.
    pub fn answer(text: impl Into<String>) -> Self {
        Self::Message {
            parts: vec![MessagePart::text(text)],
            is_partial: false,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn done(final_state: TaskState) -> Self {
        Self::Done { final_state }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// The stream returned by the orchestrator.
pub type TaskEventStream = Pin<Box<dyn Stream<Item = TaskEvent> + Send>>;

/// Sending half of an event stream.
///
/// Emitting after the receiver is gone is not an error; the execution
/// still runs to completion so the skill stack unwinds normally.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl EventSender {
    pub fn emit(&self, event: TaskEvent) {
        if self.tx.unbounded_send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

/// Create a connected sender and stream.
pub fn event_channel() -> (EventSender, TaskEventStream) {
    let (tx, rx) = mpsc::unbounded();
    (EventSender { tx }, Box::pin(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(TaskEvent::done(TaskState::Completed)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "done", "final_state": "completed"}));

        let json = serde_json::to_value(TaskEvent::answer("hi")).unwrap();
        assert_eq!(json["parts"][0], serde_json::json!({"kind": "text", "text": "hi"}));
    }

    #[tokio::test]
    async fn channel_delivers_in_order_and_ends_when_sender_drops() {
        let (tx, stream) = event_channel();
        tx.emit(TaskEvent::status(TaskState::Working));
        tx.emit(TaskEvent::done(TaskState::Failed));
        drop(tx);
        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![
                TaskEvent::status(TaskState::Working),
                TaskEvent::done(TaskState::Failed)
            ]
        );
    }

    #[test]
    fn emit_after_receiver_dropped_is_silent() {
        let (tx, stream) = event_channel();
        drop(stream);
        tx.emit(TaskEvent::status(TaskState::Working));
    }
}
