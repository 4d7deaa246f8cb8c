//! Independent executions sharing workers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use market_graph::{GraphBuilder, RunStatus, SequenceRouter, SharedState, Worker};

use crate::support::{LazyClientWorker, ReplyWorker};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_share_lazy_client() {
    let builds = Arc::new(AtomicUsize::new(0));
    let graph = GraphBuilder::new()
        .with_worker("search", ReplyWorker::new("search"))
        .with_worker("reporter", LazyClientWorker::new(builds.clone()))
        .with_router(SequenceRouter::new(["search", "reporter"]))
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let graph = graph.clone();
        handles.push(tokio::spawn(async move {
            graph
                .run_graph(SharedState::from_query(format!("query {}", i)))
                .await
        }));
    }

    let mut run_ids = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.status, RunStatus::Terminated);

        // Each run only ever sees its own query
        let history = outcome.state.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content(), format!("query {}", i));
        assert_eq!(history[1].content(), format!("search: query {}", i));
        assert_eq!(history[2].content(), "written with report-client");
        run_ids.push(outcome.run_id);
    }

    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 8);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_standalone_and_graph_calls_share_client() {
    let builds = Arc::new(AtomicUsize::new(0));
    let reporter = Arc::new(LazyClientWorker::new(builds.clone()));

    let mut builder = GraphBuilder::new().with_router(SequenceRouter::new(["reporter"]));
    builder.add_shared_worker("reporter", reporter.clone());
    let graph = builder.build().unwrap();

    let standalone = {
        let reporter = reporter.clone();
        tokio::spawn(async move { reporter.invoke("direct").await })
    };
    let through_graph = {
        let graph = graph.clone();
        tokio::spawn(async move { graph.invoke("reporter", "routed").await })
    };
    let full_run = tokio::spawn(async move { graph.run_graph(SharedState::from_query("q")).await });

    assert_eq!(
        standalone.await.unwrap().unwrap().answer,
        "direct via report-client"
    );
    assert_eq!(
        through_graph.await.unwrap().unwrap().answer,
        "routed via report-client"
    );
    assert_eq!(full_run.await.unwrap().unwrap().steps.len(), 1);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}
