//! Step results returned by workers
//!
//! A [`Handoff`] pairs a state patch with a routing directive. The engine
//! validates the directive and merges the patch only when the whole step
//! succeeded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::UpstreamError;
use crate::state::{Message, Target};

/// Partial patch applied to the shared state after a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Field entries, shallow-merged last-write-wins
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Messages appended to the history, in order
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.messages.is_empty()
    }
}

/// What a worker hands back to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub update: StateUpdate,
    pub next: Target,
}

impl Handoff {
    /// Create a handoff with an empty update
    pub fn to(next: Target) -> Self {
        Self {
            update: StateUpdate::default(),
            next,
        }
    }

    /// Return control to the router
    pub fn back_to_router() -> Self {
        Self::to(Target::Router)
    }

    /// End the run
    pub fn finish() -> Self {
        Self::to(Target::Finish)
    }

    /// Hand control straight to another worker
    pub fn to_worker(name: impl Into<String>) -> Self {
        Self::to(Target::worker(name))
    }

    /// Append a message to the update
    pub fn with_message(mut self, message: Message) -> Self {
        self.update.messages.push(message);
        self
    }

    /// Set a field in the update
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.update.fields.insert(key.into(), value);
        self
    }

    /// A reply from `worker` routed back to the router
    pub fn reply(worker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::back_to_router().with_message(Message::assistant(worker, content))
    }

    /// Recover from an upstream failure
    ///
    /// The failure is surfaced as an explanatory message so the router can
    /// pick another worker or finish.
    pub fn degraded(worker: impl Into<String>, error: &UpstreamError) -> Self {
        let worker = worker.into();
        let content = format!("{} could not complete the request: {}", worker, error);
        Self::reply(worker, content)
    }
}

/// Result of a standalone [`Worker::invoke`](crate::worker::Worker::invoke) call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
}

impl Answer {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}
