//! Error types for graph construction and execution

use crate::engine::RunStatus;

/// Errors that can occur while building or running a graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A router decision or handoff named a target that is not a member
    #[error("invalid route '{target}' (members: {})", .members.join(", "))]
    InvalidRoute { target: String, members: Vec<String> },

    /// A dispatched worker failed and produced no fallback handoff
    #[error("worker '{worker}' failed: {source:#}")]
    WorkerExecution {
        worker: String,
        #[source]
        source: anyhow::Error,
    },

    /// The router itself failed to produce a decision
    #[error("router failed: {source:#}")]
    RouterFailure {
        #[source]
        source: anyhow::Error,
    },

    /// More workers were dispatched than the configured maximum
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: usize },

    /// The execution already terminated or failed
    #[error("execution already finished with status {status:?}")]
    ExecutionFinished { status: RunStatus },

    #[error("graph has no router")]
    MissingRouter,

    #[error("graph has no registered workers")]
    NoWorkers,

    #[error("invalid worker name '{name}': {reason}")]
    InvalidWorkerName { name: String, reason: String },

    #[error("unknown worker: {name}")]
    UnknownWorker { name: String },

    #[error("config error: {0}")]
    Config(String),
}

impl GraphError {
    /// Whether the error was raised by the step loop (as opposed to a usage error)
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            GraphError::InvalidRoute { .. }
                | GraphError::WorkerExecution { .. }
                | GraphError::RouterFailure { .. }
                | GraphError::StepLimitExceeded { .. }
        )
    }
}

/// A worker's external dependency call failed
///
/// Workers either turn this into a degraded handoff (see
/// [`Handoff::degraded`](crate::handoff::Handoff::degraded)) or return it from
/// `run`, where the engine reports it as [`GraphError::WorkerExecution`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{service} request failed: {message}")]
pub struct UpstreamError {
    pub service: String,
    pub message: String,
}

impl UpstreamError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}
