//! Graph events for real-time visibility
//!
//! Events are emitted by the engine while an execution runs. They can be
//! consumed by CLI output, a web layer, or any other subscriber.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ============================================================================
// Graph Events
// ============================================================================

/// Events emitted by the engine during an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// Execution started
    RunStarted {
        run_id: String,
        /// Members the router may choose from
        members: Vec<String>,
    },

    /// Router produced a validated decision
    RouteDecided { run_id: String, target: String },

    /// Worker dispatch is starting
    WorkerStarted {
        run_id: String,
        worker: String,
        /// 1-based dispatch number within the run
        step: usize,
    },

    /// Worker returned and its handoff was merged
    WorkerCompleted {
        run_id: String,
        worker: String,
        step: usize,
        #[serde(with = "duration_millis")]
        duration: Duration,
    },

    /// Execution reached the finish target
    RunTerminated { run_id: String, steps: usize },

    /// Execution failed; state was left as of the last completed step
    RunFailed { run_id: String, error: String },
}

/// Serialize Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// Event Channel
// ============================================================================

/// Sender for graph events
pub type EventSender = mpsc::UnboundedSender<GraphEvent>;

/// Receiver for graph events
pub type EventReceiver = mpsc::UnboundedReceiver<GraphEvent>;

/// Create a new event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Optional, best-effort event sink
///
/// A dropped receiver never fails a run.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<EventSender>,
}

impl EventSink {
    pub(crate) fn new(sender: Option<EventSender>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                tracing::trace!("Graph event receiver dropped");
            }
        }
    }
}
