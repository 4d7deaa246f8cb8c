//! Worker registry and graph builder
//!
//! Workers are registered under explicit names. The builder freezes the
//! current registrations into a [`CompiledGraph`] whose only static edge is
//! entry → router.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::GraphConfig;
use crate::engine::CompiledGraph;
use crate::error::GraphError;
use crate::events::{EventSender, EventSink};
use crate::router::Router;
use crate::state::END;
use crate::worker::Worker;

/// HTTP route for one worker's standalone entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRoute {
    /// Registered worker name
    pub name: String,
    /// The worker's own description, empty when it has none
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Path the external HTTP layer mounts a POST handler on
    pub path: String,
}

/// Path derived from a worker's registered name
pub fn route_path(name: &str) -> String {
    format!("/{}", name)
}

/// Registry of available workers, keyed by name
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            workers: BTreeMap::new(),
        }
    }

    /// Register a worker, replacing and returning any previous entry
    pub fn register(
        &mut self,
        name: impl Into<String>,
        worker: Arc<dyn Worker>,
    ) -> Option<Arc<dyn Worker>> {
        self.workers.insert(name.into(), worker)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.remove(name)
    }

    /// Get a worker by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// List all worker names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(|s| s.as_str())
    }

    /// Iterate over all workers
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Worker>)> {
        self.workers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn routes(&self) -> Vec<WorkerRoute> {
        self.iter()
            .map(|(name, worker)| WorkerRoute {
                name: name.to_string(),
                description: worker.description().to_string(),
                path: route_path(name),
            })
            .collect()
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Accumulates registrations and compiles a runnable graph
#[derive(Default)]
pub struct GraphBuilder {
    registry: WorkerRegistry,
    router: Option<Arc<dyn Router>>,
    config: GraphConfig,
    event_sender: Option<EventSender>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker` under `name`, returning the worker it replaced
    pub fn add_worker<W: Worker + 'static>(
        &mut self,
        name: impl Into<String>,
        worker: W,
    ) -> Option<Arc<dyn Worker>> {
        self.add_shared_worker(name, Arc::new(worker))
    }

    /// Register a worker that is already shared elsewhere
    pub fn add_shared_worker(
        &mut self,
        name: impl Into<String>,
        worker: Arc<dyn Worker>,
    ) -> Option<Arc<dyn Worker>> {
        let name = name.into();
        let replaced = self.registry.register(name.clone(), worker);
        if replaced.is_some() {
            tracing::debug!("Replaced worker registration: {}", name);
        }
        replaced
    }

    /// Chaining form of [`GraphBuilder::add_worker`]
    pub fn with_worker<W: Worker + 'static>(mut self, name: impl Into<String>, worker: W) -> Self {
        self.add_worker(name, worker);
        self
    }

    pub fn remove_worker(&mut self, name: &str) -> Option<Arc<dyn Worker>> {
        self.registry.remove(name)
    }

    /// Currently registered names, sorted
    pub fn list_members(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    pub fn set_router<R: Router + 'static>(&mut self, router: R) {
        self.router = Some(Arc::new(router));
    }

    pub fn with_router<R: Router + 'static>(mut self, router: R) -> Self {
        self.set_router(router);
        self
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Set event sender for real-time visibility
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Freeze the current registrations into a runnable graph
    ///
    /// The builder stays usable; later registrations do not affect graphs
    /// already built.
    pub fn build(&self) -> Result<CompiledGraph, GraphError> {
        let router = self.router.clone().ok_or(GraphError::MissingRouter)?;

        if self.config.router_name.trim().is_empty() {
            return Err(GraphError::Config("router_name cannot be empty".to_string()));
        }
        if self.config.finish_keyword.trim().is_empty() {
            return Err(GraphError::Config("finish_keyword cannot be empty".to_string()));
        }
        if self
            .config
            .router_name
            .eq_ignore_ascii_case(&self.config.finish_keyword)
        {
            return Err(GraphError::Config(format!(
                "router_name '{}' collides with finish_keyword '{}'",
                self.config.router_name, self.config.finish_keyword
            )));
        }
        if self.registry.is_empty() {
            return Err(GraphError::NoWorkers);
        }
        for name in self.registry.names() {
            self.check_name(name)?;
        }

        tracing::info!("Building graph with {} workers", self.registry.len());
        Ok(CompiledGraph::new(
            self.registry.clone(),
            router,
            self.config.clone(),
            EventSink::new(self.event_sender.clone()),
        ))
    }

    fn check_name(&self, name: &str) -> Result<(), GraphError> {
        let invalid = |reason: &str| GraphError::InvalidWorkerName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if name.trim() != name {
            return Err(invalid("name cannot have surrounding whitespace"));
        }
        if name == self.config.router_name {
            return Err(invalid("name is reserved for the router"));
        }
        if name == END || name.eq_ignore_ascii_case(&self.config.finish_keyword) {
            return Err(invalid("name is reserved for finishing the run"));
        }
        Ok(())
    }
}
