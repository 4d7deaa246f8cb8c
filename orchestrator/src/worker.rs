//! Worker contract and helpers
//!
//! A worker is one bounded unit of work. It is reached two ways:
//! - `run`, dispatched by the engine with a read-only view of the shared state
//! - `invoke`, a standalone entry point that bypasses routing entirely

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::handoff::{Answer, Handoff};
use crate::state::SharedState;

/// Capability contract every registered worker implements
///
/// Workers are built once and shared across concurrent executions, so they
/// must be `Send + Sync`. `run` only sees a shared borrow of the state; every
/// change goes through the returned [`Handoff`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute one step against the current state
    async fn run(&self, state: &SharedState) -> Result<Handoff>;

    /// Answer a query directly, outside of any graph execution
    async fn invoke(&self, query: &str) -> Result<Answer>;

    /// Short human-readable description
    fn description(&self) -> &str {
        ""
    }
}

#[async_trait]
impl<W: Worker + ?Sized> Worker for Arc<W> {
    async fn run(&self, state: &SharedState) -> Result<Handoff> {
        (**self).run(state).await
    }

    async fn invoke(&self, query: &str) -> Result<Answer> {
        (**self).invoke(query).await
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

type RunFn = dyn Fn(&SharedState) -> Result<Handoff> + Send + Sync;
type InvokeFn = dyn Fn(&str) -> Result<Answer> + Send + Sync;

/// Worker built from plain closures
///
/// Useful for rule-based steps and tests. Without an explicit invoke closure,
/// `invoke` echoes the query back.
pub struct FnWorker {
    description: String,
    run: Box<RunFn>,
    invoke: Option<Box<InvokeFn>>,
}

impl FnWorker {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(&SharedState) -> Result<Handoff> + Send + Sync + 'static,
    {
        Self {
            description: String::new(),
            run: Box::new(run),
            invoke: None,
        }
    }

    pub fn with_invoke<F>(mut self, invoke: F) -> Self
    where
        F: Fn(&str) -> Result<Answer> + Send + Sync + 'static,
    {
        self.invoke = Some(Box::new(invoke));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Worker for FnWorker {
    async fn run(&self, state: &SharedState) -> Result<Handoff> {
        (self.run)(state)
    }

    async fn invoke(&self, query: &str) -> Result<Answer> {
        match &self.invoke {
            Some(invoke) => invoke(query),
            None => Ok(Answer::new(query)),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// One-time, lock-guarded initialization slot for a worker's sub-resource
///
/// The first caller runs the initializer; concurrent callers wait for it and
/// then share the same value. A failed fallible initialization leaves the slot
/// empty so a later call can try again.
pub struct LazyResource<T> {
    cell: OnceCell<T>,
}

impl<T> LazyResource<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Slot that is already filled, for dependencies injected at construction
    pub fn ready(value: T) -> Self {
        Self {
            cell: OnceCell::new_with(Some(value)),
        }
    }

    pub async fn get_or_init<F, Fut>(&self, init: F) -> &T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.cell.get_or_init(init).await
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell.get_or_try_init(init).await
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

impl<T> Default for LazyResource<T> {
    fn default() -> Self {
        Self::new()
    }
}
