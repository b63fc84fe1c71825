//! Events emitted by a streaming reasoning run.
//!
//! The gateway or a CLI can forward these to clients as they happen.

use markwright_core::error::panic_message;
use markwright_core::message::Message;
use markwright_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::loop_runner::RunOutcome;

/// One step of a streaming run.
///
/// - `message`: a message the loop appended (assistant turn, tool result,
///   finalization instruction)
/// - `finished`: the run succeeded; carries the full outcome
/// - `failed`: the run failed; carries the error text (the typed error comes
///   from [`RunStream::finish`])
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// A message was appended to the conversation.
    Message { message: Message },

    /// The run reached `Done`.
    Finished { outcome: RunOutcome },

    /// The run reached `Failed`.
    Failed { error: String },
}

impl LoopEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Finished { .. } => "finished",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Message { .. })
    }
}

/// A run on its own task: the events it emits plus its typed result.
pub struct RunStream {
    events: mpsc::Receiver<LoopEvent>,
    task: JoinHandle<Result<RunOutcome>>,
}

impl RunStream {
    pub(crate) fn new(
        events: mpsc::Receiver<LoopEvent>,
        task: JoinHandle<Result<RunOutcome>>,
    ) -> Self {
        Self { events, task }
    }

    /// Next event, or `None` after the terminal one.
    pub async fn recv(&mut self) -> Option<LoopEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end and return its outcome or its typed error.
    ///
    /// Events not yet received are discarded; the run itself continues to
    /// completion.
    pub async fn finish(self) -> Result<RunOutcome> {
        drop(self.events);
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(Error::Internal(format!(
                "reasoning run panicked: {}",
                panic_message(&*e.into_panic())
            ))),
            Err(e) => Err(Error::Internal(format!("reasoning run did not finish: {e}"))),
        }
    }
}
