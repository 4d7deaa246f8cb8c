//! Shared workers and routers for the integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use market_graph::{
    Answer, Handoff, LazyResource, Message, SharedState, UpstreamError, Worker,
};

/// Appends exactly one message and records its call count under its own key
pub struct ReplyWorker {
    name: String,
    calls: AtomicUsize,
}

impl ReplyWorker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for ReplyWorker {
    async fn run(&self, state: &SharedState) -> Result<Handoff> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let query = state
            .history()
            .first()
            .map(|m| m.content().to_string())
            .unwrap_or_default();

        Ok(Handoff::reply(self.name.clone(), format!("{}: {}", self.name, query))
            .with_field(self.name.clone(), json!({ "calls": calls })))
    }

    async fn invoke(&self, query: &str) -> Result<Answer> {
        Ok(Answer::new(format!("{} answered {}", self.name, query)))
    }

    fn description(&self) -> &str {
        "Replies once per dispatch"
    }
}

/// Always fails inside `run` with an upstream error
pub struct FailingWorker;

#[async_trait]
impl Worker for FailingWorker {
    async fn run(&self, _state: &SharedState) -> Result<Handoff> {
        Err(UpstreamError::new("naver", "connection reset").into())
    }

    async fn invoke(&self, _query: &str) -> Result<Answer> {
        Err(UpstreamError::new("naver", "connection reset").into())
    }
}

/// Catches its upstream failure and degrades instead of failing the run
pub struct DegradingWorker;

#[async_trait]
impl Worker for DegradingWorker {
    async fn run(&self, _state: &SharedState) -> Result<Handoff> {
        match fetch_quotes().await {
            Ok(quotes) => Ok(Handoff::reply("quotes", quotes)),
            Err(e) => Ok(Handoff::degraded("quotes", &e)),
        }
    }

    async fn invoke(&self, query: &str) -> Result<Answer> {
        Ok(Answer::new(fetch_quotes().await.unwrap_or_else(|e| format!("{}: {}", query, e))))
    }
}

async fn fetch_quotes() -> Result<String, UpstreamError> {
    Err(UpstreamError::new("alpha-vantage", "rate limited"))
}

/// Builds its client on first use and counts how often that happened
pub struct LazyClientWorker {
    client: LazyResource<String>,
    builds: Arc<AtomicUsize>,
}

impl LazyClientWorker {
    pub fn new(builds: Arc<AtomicUsize>) -> Self {
        Self {
            client: LazyResource::new(),
            builds,
        }
    }

    async fn client(&self) -> &String {
        self.client
            .get_or_init(|| async {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                self.builds.fetch_add(1, Ordering::SeqCst);
                "report-client".to_string()
            })
            .await
    }
}

#[async_trait]
impl Worker for LazyClientWorker {
    async fn run(&self, _state: &SharedState) -> Result<Handoff> {
        let client = self.client().await;
        Ok(Handoff::reply("reporter", format!("written with {}", client)))
    }

    async fn invoke(&self, query: &str) -> Result<Answer> {
        let client = self.client().await;
        Ok(Answer::new(format!("{} via {}", query, client)))
    }
}

/// Copy of the parts of the state a failed step must leave untouched
pub fn snapshot(state: &SharedState) -> (Vec<Message>, Map<String, Value>) {
    (state.history().to_vec(), state.fields().clone())
}
