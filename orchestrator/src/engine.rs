//! Graph execution engine
//!
//! Drives the step loop for one request:
//! - Ask the router for the next target
//! - Validate it against the member set
//! - Dispatch the chosen worker with a read-only view of the state
//! - Validate and merge the worker's handoff
//!
//! A step either commits completely or not at all. When a step fails the
//! error is returned and the state is left exactly as it was before the step.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::events::{EventSink, GraphEvent};
use crate::handoff::{Answer, Handoff};
use crate::registry::{WorkerRegistry, WorkerRoute};
use crate::router::Router;
use crate::state::{Members, Message, SharedState, Target};

/// Lifecycle of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, no step taken yet
    Init,
    /// At least one step taken, not finished
    Running,
    /// Reached the finish target
    Terminated,
    /// A step failed; the error was returned to the caller
    Failed,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Terminated | RunStatus::Failed)
    }
}

/// Result of a single [`Execution::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More work remains
    Continue,
    /// The finish target was reached
    Finished,
}

/// Record of one worker dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based dispatch number
    pub index: usize,

    /// Worker that ran
    pub worker: String,

    /// Wall-clock duration of the worker call
    pub duration_ms: u64,

    /// Messages appended by this step (router rationale included)
    pub messages_appended: usize,

    /// Field keys written by this step
    pub fields_written: Vec<String>,

    /// Where control went afterwards
    pub next: Target,
}

/// Final result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub state: SharedState,
    pub steps: Vec<StepRecord>,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.field(key)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.state.last_message()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }
}

struct GraphInner {
    registry: WorkerRegistry,
    router: Arc<dyn Router>,
    members: Members,
    config: GraphConfig,
    events: EventSink,
}

/// A frozen, runnable graph
///
/// Cheap to clone and safe to share; every call to [`CompiledGraph::start`]
/// creates an independent [`Execution`].
#[derive(Clone)]
pub struct CompiledGraph {
    inner: Arc<GraphInner>,
}

impl CompiledGraph {
    pub(crate) fn new(
        registry: WorkerRegistry,
        router: Arc<dyn Router>,
        config: GraphConfig,
        events: EventSink,
    ) -> Self {
        let members = Members::new(
            registry.names().map(str::to_string),
            config.router_name.clone(),
            config.finish_keyword.clone(),
        )
        .with_descriptions(
            registry
                .iter()
                .map(|(name, worker)| (name.to_string(), worker.description().to_string())),
        );

        Self {
            inner: Arc::new(GraphInner {
                registry,
                router,
                members,
                config,
                events,
            }),
        }
    }

    pub fn members(&self) -> &Members {
        &self.inner.members
    }

    /// Member names in sorted order
    pub fn list_members(&self) -> Vec<String> {
        self.inner.members.to_vec()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// One route per member for an external HTTP layer
    pub fn routes(&self) -> Vec<WorkerRoute> {
        self.inner.registry.routes()
    }

    /// Call a member's standalone entry point, bypassing the router
    pub async fn invoke(&self, worker: &str, query: &str) -> Result<Answer, GraphError> {
        let handle = self
            .inner
            .registry
            .get(worker)
            .ok_or_else(|| GraphError::UnknownWorker {
                name: worker.to_string(),
            })?;

        handle
            .invoke(query)
            .await
            .map_err(|source| GraphError::WorkerExecution {
                worker: worker.to_string(),
                source,
            })
    }

    /// Begin a new execution seeded with `initial`
    ///
    /// The member set on the state is replaced with the graph's own and any
    /// routing target it carries is cleared, so the first step always asks the
    /// router.
    pub fn start(&self, mut initial: SharedState) -> Execution {
        initial.set_members(self.inner.members.clone());
        initial.clear_next_target();
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("graph_run", run_id = %run_id);

        Execution {
            graph: self.clone(),
            run_id,
            state: initial,
            status: RunStatus::Init,
            steps: Vec::new(),
            span,
        }
    }

    /// Run a request to completion
    pub async fn run_graph(&self, initial: SharedState) -> Result<RunOutcome, GraphError> {
        let mut execution = self.start(initial);
        execution.run_to_end().await?;
        Ok(execution.into_outcome())
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("members", &self.inner.members.to_vec())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// One in-flight request against a [`CompiledGraph`]
pub struct Execution {
    graph: CompiledGraph,
    run_id: String,
    state: SharedState,
    status: RunStatus,
    steps: Vec<StepRecord>,
    span: tracing::Span,
}

impl Execution {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn into_state(self) -> SharedState {
        self.state
    }

    pub fn into_outcome(self) -> RunOutcome {
        RunOutcome {
            run_id: self.run_id,
            state: self.state,
            steps: self.steps,
            status: self.status,
        }
    }

    /// Step until the finish target is reached or a step fails
    pub async fn run_to_end(&mut self) -> Result<(), GraphError> {
        loop {
            if self.step().await? == StepOutcome::Finished {
                return Ok(());
            }
        }
    }

    /// Take one step: consult the router if needed, then dispatch at most one
    /// worker
    pub async fn step(&mut self) -> Result<StepOutcome, GraphError> {
        match self.status {
            RunStatus::Terminated | RunStatus::Failed => {
                return Err(GraphError::ExecutionFinished {
                    status: self.status,
                });
            }
            RunStatus::Init => {
                self.status = RunStatus::Running;
                self.span.in_scope(|| {
                    tracing::info!(
                        "Starting run with members: {}",
                        self.graph.list_members().join(", ")
                    )
                });
                self.emit(GraphEvent::RunStarted {
                    run_id: self.run_id.clone(),
                    members: self.graph.list_members(),
                });
            }
            RunStatus::Running => {}
        }

        let span = self.span.clone();
        match self.advance().instrument(span.clone()).await {
            Ok(StepOutcome::Finished) => {
                self.status = RunStatus::Terminated;
                span.in_scope(|| tracing::info!("Run finished after {} steps", self.steps.len()));
                self.emit(GraphEvent::RunTerminated {
                    run_id: self.run_id.clone(),
                    steps: self.steps.len(),
                });
                Ok(StepOutcome::Finished)
            }
            Ok(StepOutcome::Continue) => Ok(StepOutcome::Continue),
            Err(e) => {
                self.status = RunStatus::Failed;
                span.in_scope(|| tracing::warn!("Run failed: {}", e));
                self.emit(GraphEvent::RunFailed {
                    run_id: self.run_id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn advance(&mut self) -> Result<StepOutcome, GraphError> {
        // Router rationale is held back until the whole step succeeds
        let mut staged: Vec<Message> = Vec::new();

        let target = match self.state.next_target() {
            None | Some(Target::Router) => self.consult_router(&mut staged).await?,
            Some(target) => target.clone(),
        };

        let worker_name = match target {
            Target::Worker(name) => name,
            Target::Finish => {
                self.state.append(staged);
                self.state.set_next_target(Target::Finish);
                return Ok(StepOutcome::Finished);
            }
            Target::Router => {
                let members = self.graph.members();
                return Err(GraphError::InvalidRoute {
                    target: members.router_name().to_string(),
                    members: members.to_vec(),
                });
            }
        };

        if let Some(limit) = self.graph.config().step_limit() {
            if self.steps.len() >= limit {
                return Err(GraphError::StepLimitExceeded { limit });
            }
        }

        let worker = self
            .graph
            .inner
            .registry
            .get(&worker_name)
            .ok_or_else(|| GraphError::UnknownWorker {
                name: worker_name.clone(),
            })?;

        let index = self.steps.len() + 1;
        tracing::info!("Starting {}...", worker_name);
        self.emit(GraphEvent::WorkerStarted {
            run_id: self.run_id.clone(),
            worker: worker_name.clone(),
            step: index,
        });

        let started = Instant::now();
        let handoff = worker
            .run(&self.state)
            .await
            .map_err(|source| GraphError::WorkerExecution {
                worker: worker_name.clone(),
                source,
            })?;
        let elapsed = started.elapsed();

        self.graph.members().validate(&handoff.next)?;

        let Handoff { update, next } = handoff;
        let mut fields_written: Vec<String> = update.fields.keys().cloned().collect();
        fields_written.sort();
        let messages_appended = staged.len() + update.messages.len();

        self.state.append(staged);
        self.state.append(update.messages);
        self.state.merge_fields(update.fields);
        self.state.set_next_target(next.clone());

        tracing::info!(
            "{} completed in {}ms (next: {})",
            worker_name,
            elapsed.as_millis(),
            next
        );
        self.emit(GraphEvent::WorkerCompleted {
            run_id: self.run_id.clone(),
            worker: worker_name.clone(),
            step: index,
            duration: elapsed,
        });

        let finished = next.is_finish();
        self.steps.push(StepRecord {
            index,
            worker: worker_name,
            duration_ms: elapsed.as_millis() as u64,
            messages_appended,
            fields_written,
            next,
        });

        Ok(if finished {
            StepOutcome::Finished
        } else {
            StepOutcome::Continue
        })
    }

    async fn consult_router(&self, staged: &mut Vec<Message>) -> Result<Target, GraphError> {
        let members = self.graph.members();
        let decision = self
            .graph
            .inner
            .router
            .decide(self.state.history(), members)
            .await
            .map_err(|source| GraphError::RouterFailure { source })?;

        let target = members.resolve(&decision.next)?;
        if target == Target::Router {
            // A router cannot route to itself
            return Err(GraphError::InvalidRoute {
                target: decision.next,
                members: members.to_vec(),
            });
        }

        tracing::debug!("Router decided: {}", target);
        self.emit(GraphEvent::RouteDecided {
            run_id: self.run_id.clone(),
            target: target.to_string(),
        });

        if let Some(rationale) = decision.rationale {
            staged.push(Message::assistant(members.router_name(), rationale));
        }

        Ok(target)
    }

    fn emit(&self, event: GraphEvent) {
        self.graph.inner.events.emit(event);
    }
}
