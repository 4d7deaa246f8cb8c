//! End-to-end request flows

use std::sync::Arc;

use market_graph::{
    event_channel, Decision, FnRouter, GraphBuilder, GraphError, GraphEvent, RunStatus,
    SequenceRouter, SharedState, Target, Worker,
};

use crate::support::{snapshot, DegradingWorker, FailingWorker, ReplyWorker};

#[tokio::test]
async fn test_happy_path_search_then_report() {
    let search = Arc::new(ReplyWorker::new("search"));
    let reporter = Arc::new(ReplyWorker::new("reporter"));

    let mut builder = GraphBuilder::new().with_router(SequenceRouter::new(["search", "reporter"]));
    builder.add_shared_worker("search", search.clone());
    builder.add_shared_worker("reporter", reporter.clone());
    let graph = builder.build().unwrap();

    let initial = SharedState::from_query("Weekly recap for NVDA");
    let initial_len = initial.history().len();

    let mut execution = graph.start(initial);
    execution.run_to_end().await.unwrap();

    assert_eq!(execution.status(), RunStatus::Terminated);
    assert_eq!(execution.state().history().len(), initial_len + 2);
    assert_eq!(execution.state().next_target(), Some(&Target::Finish));
    assert_eq!(search.calls(), 1);
    assert_eq!(reporter.calls(), 1);

    let producers: Vec<_> = execution
        .state()
        .history()
        .iter()
        .map(|m| m.producer().to_string())
        .collect();
    assert_eq!(producers, vec!["user", "search", "reporter"]);

    let steps = execution.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].worker, "search");
    assert_eq!(steps[1].worker, "reporter");
    assert_eq!(steps[1].fields_written, vec!["reporter"]);
}

#[tokio::test]
async fn test_fatal_worker_error() {
    let graph = GraphBuilder::new()
        .with_worker("search", FailingWorker)
        .with_worker("reporter", ReplyWorker::new("reporter"))
        .with_router(SequenceRouter::new(["search", "reporter"]))
        .build()
        .unwrap();

    let initial = SharedState::from_query("q").with_field("ticker", serde_json::json!("NVDA"));
    let mut execution = graph.start(initial);
    let before = snapshot(execution.state());

    let err = execution.run_to_end().await.unwrap_err();
    match &err {
        GraphError::WorkerExecution { worker, source } => {
            assert_eq!(worker, "search");
            assert!(source.to_string().contains("connection reset"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(execution.status(), RunStatus::Failed);
    assert_eq!(snapshot(execution.state()), before);
    assert!(execution.steps().is_empty());
}

#[tokio::test]
async fn test_direct_invocation_bypass() {
    let worker = ReplyWorker::new("search");

    let answer = worker.invoke("test query").await.unwrap();

    assert_eq!(answer.answer, "search answered test query");
    assert_eq!(worker.calls(), 0);
}

#[tokio::test]
async fn test_invalid_route() {
    let graph = GraphBuilder::new()
        .with_worker("search", ReplyWorker::new("search"))
        .with_worker("reporter", ReplyWorker::new("reporter"))
        .with_router(FnRouter::new(|_, _| Ok(Decision::to("nonexistent"))))
        .build()
        .unwrap();

    let mut execution = graph.start(SharedState::from_query("q"));
    let before = snapshot(execution.state());

    let err = execution.step().await.unwrap_err();
    match err {
        GraphError::InvalidRoute { target, members } => {
            assert_eq!(target, "nonexistent");
            assert_eq!(members, vec!["reporter", "search"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(execution.status(), RunStatus::Failed);
    assert_eq!(snapshot(execution.state()), before);
    assert_eq!(execution.state().next_target(), None);
}

#[tokio::test]
async fn test_degraded_worker_keeps_run_alive() {
    let graph = GraphBuilder::new()
        .with_worker("quotes", DegradingWorker)
        .with_worker("reporter", ReplyWorker::new("reporter"))
        .with_router(SequenceRouter::new(["quotes", "reporter"]))
        .build()
        .unwrap();

    let outcome = graph.run_graph(SharedState::from_query("AAPL")).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Terminated);
    let history = outcome.state.history();
    assert_eq!(history.len(), 3);
    assert!(history[1].content().contains("alpha-vantage request failed"));
    assert_eq!(history[2].producer(), "reporter");
}

#[tokio::test]
async fn test_events_follow_run() {
    let (tx, mut rx) = event_channel();
    let graph = GraphBuilder::new()
        .with_worker("search", ReplyWorker::new("search"))
        .with_router(SequenceRouter::new(["search"]))
        .with_event_sender(tx)
        .build()
        .unwrap();

    let outcome = graph.run_graph(SharedState::from_query("q")).await.unwrap();
    drop(graph);

    let mut kinds = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            GraphEvent::RunStarted { run_id, members } => {
                assert_eq!(run_id, outcome.run_id);
                assert_eq!(members, vec!["search"]);
                kinds.push("started");
            }
            GraphEvent::RouteDecided { target, .. } => kinds.push(if target == "search" {
                "route:search"
            } else {
                "route:finish"
            }),
            GraphEvent::WorkerStarted { step, .. } => {
                assert_eq!(step, 1);
                kinds.push("worker_started");
            }
            GraphEvent::WorkerCompleted { worker, .. } => {
                assert_eq!(worker, "search");
                kinds.push("worker_completed");
            }
            GraphEvent::RunTerminated { steps, .. } => {
                assert_eq!(steps, 1);
                kinds.push("terminated");
            }
            GraphEvent::RunFailed { error, .. } => panic!("unexpected failure: {error}"),
        }
    }

    assert_eq!(
        kinds,
        vec![
            "started",
            "route:search",
            "worker_started",
            "worker_completed",
            "route:finish",
            "terminated"
        ]
    );
}

#[tokio::test]
async fn test_failed_run_emits_failure_event() {
    let (tx, mut rx) = event_channel();
    let graph = GraphBuilder::new()
        .with_worker("search", FailingWorker)
        .with_router(SequenceRouter::new(["search"]))
        .with_event_sender(tx)
        .build()
        .unwrap();

    assert!(graph.run_graph(SharedState::from_query("q")).await.is_err());
    drop(graph);

    let mut last = None;
    while let Some(event) = rx.recv().await {
        last = Some(event);
    }
    assert!(matches!(last, Some(GraphEvent::RunFailed { .. })));
}
