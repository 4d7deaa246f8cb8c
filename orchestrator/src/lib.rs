//! Supervisor-routed worker graphs
//!
//! This crate provides:
//! - A worker contract with a graph entry point and a standalone entry point
//! - An append-only shared state threaded through each request
//! - Routers that pick the next worker, including a model-backed supervisor
//! - A builder that freezes registrations into a runnable graph
//! - An engine that steps the graph with all-or-nothing step commits
//!
//! # Example
//!
//! ```rust,ignore
//! use market_graph::{GraphBuilder, SequenceRouter, SharedState};
//!
//! let graph = GraphBuilder::new()
//!     .with_worker("search", search_worker)
//!     .with_worker("reporter", reporter_worker)
//!     .with_router(SequenceRouter::new(["search", "reporter"]))
//!     .build()?;
//!
//! let outcome = graph
//!     .run_graph(SharedState::from_query("Weekly recap for NVDA"))
//!     .await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod handoff;
pub mod prompts;
pub mod registry;
pub mod router;
pub mod state;
pub mod telemetry;
pub mod worker;

pub use config::{GraphConfig, GraphFileConfig};
pub use engine::{CompiledGraph, Execution, RunOutcome, RunStatus, StepOutcome, StepRecord};
pub use error::{GraphError, UpstreamError};
pub use events::{event_channel, EventReceiver, EventSender, GraphEvent};
pub use handoff::{Answer, Handoff, StateUpdate};
pub use registry::{GraphBuilder, WorkerRegistry, WorkerRoute};
pub use router::{Decision, DecisionModel, FnRouter, ModelRouter, Router, SequenceRouter};
pub use state::{Members, Message, Role, SharedState, Target};
pub use worker::{FnWorker, LazyResource, Worker};
