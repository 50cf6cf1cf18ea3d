//! Dependency ordering and failure containment across full scheduler runs.

use crate::fixtures::{execution_log, position, RecordingTask};
use nizima_fetch::core::graph::TaskGraph;
use nizima_fetch::core::scheduler::{DrainOutcome, Scheduler};
use nizima_fetch::Error;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

fn shared(graph: TaskGraph) -> Arc<RwLock<TaskGraph>> {
    Arc::new(RwLock::new(graph))
}

async fn drain(graph: TaskGraph, concurrency: usize) -> DrainOutcome {
    Scheduler::new(shared(graph), concurrency, CancellationToken::new())
        .run()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_diamond_respects_partial_order_at_every_bound() {
    for concurrency in [1, 2, 8] {
        let log = execution_log();
        let mut graph = TaskGraph::new();
        graph.add(RecordingTask::new("a", &[], &log));
        graph.add(RecordingTask::new("b", &["a"], &log));
        graph.add(RecordingTask::new("c", &["a"], &log));
        graph.add(RecordingTask::new("d", &["b", "c"], &log));

        assert_eq!(drain(graph, concurrency).await, DrainOutcome::Completed);

        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 4, "concurrency {concurrency}");
        assert!(position(&log, "a") < position(&log, "b"));
        assert!(position(&log, "a") < position(&log, "c"));
        assert!(position(&log, "b") < position(&log, "d"));
        assert!(position(&log, "c") < position(&log, "d"));
    }
}

#[tokio::test]
async fn test_serial_bound_still_completes_wide_graphs() {
    let log = execution_log();
    let mut graph = TaskGraph::new();
    for i in 0..10 {
        graph.add(RecordingTask::new(&format!("leaf{i}"), &[], &log));
    }
    graph.add(RecordingTask::new(
        "sink",
        &[
            "leaf0", "leaf1", "leaf2", "leaf3", "leaf4", "leaf5", "leaf6", "leaf7", "leaf8",
            "leaf9",
        ],
        &log,
    ));

    assert_eq!(drain(graph, 1).await, DrainOutcome::Completed);

    let log = log.lock().unwrap().clone();
    assert_eq!(log.len(), 11);
    assert_eq!(log.last().unwrap(), "sink");
}

#[tokio::test]
async fn test_independent_subgraphs_both_complete() {
    // Two asset chains of the same item share no edges and interleave
    // freely; each chain stays internally ordered.
    let log = execution_log();
    let mut graph = TaskGraph::new();
    graph.add(RecordingTask::new("download-preview", &[], &log));
    graph.add(RecordingTask::new(
        "extract-preview",
        &["download-preview"],
        &log,
    ));
    graph.add(RecordingTask::new("download-thumb", &[], &log));
    graph.add(RecordingTask::new("place-thumb", &["download-thumb"], &log));

    assert_eq!(drain(graph, 4).await, DrainOutcome::Completed);

    let log = log.lock().unwrap().clone();
    assert!(position(&log, "download-preview") < position(&log, "extract-preview"));
    assert!(position(&log, "download-thumb") < position(&log, "place-thumb"));
}

#[tokio::test]
async fn test_failure_starves_descendants_and_spares_the_rest() {
    let log = execution_log();
    let mut graph = TaskGraph::new();
    graph.add(RecordingTask::new("root", &[], &log));
    graph.add(RecordingTask::failing("bad", &["root"], &log));
    graph.add(RecordingTask::new("good", &["root"], &log));
    graph.add(RecordingTask::new("after-bad", &["bad"], &log));
    graph.add(RecordingTask::new("after-good", &["good"], &log));

    let outcome = drain(graph, 4).await;
    assert_eq!(
        outcome,
        DrainOutcome::Failed {
            failed: vec!["bad".to_string()]
        }
    );

    let log = log.lock().unwrap().clone();
    assert!(log.contains(&"good".to_string()));
    assert!(log.contains(&"after-good".to_string()));
    assert!(!log.contains(&"after-bad".to_string()));
}

#[tokio::test]
async fn test_cyclic_graph_never_executes() {
    let log = execution_log();
    let mut graph = TaskGraph::new();
    graph.add(RecordingTask::new("a", &["c"], &log));
    graph.add(RecordingTask::new("b", &["a"], &log));
    graph.add(RecordingTask::new("c", &["b"], &log));

    let err = Scheduler::new(shared(graph), 4, CancellationToken::new())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_reference_reported_exactly() {
    let log = execution_log();
    let mut graph = TaskGraph::new();
    graph.add(RecordingTask::new("b", &["phantom"], &log));

    let err = Scheduler::new(shared(graph), 4, CancellationToken::new())
        .run()
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("'b'"));
    assert!(message.contains("'phantom'"));
}

#[tokio::test]
async fn test_cancellation_between_waves_stops_admission() {
    let log = execution_log();
    let cancel = CancellationToken::new();

    // The root cancels the token as it runs; the dependent wave must never
    // be admitted.
    struct CancellingTask {
        inner: Arc<RecordingTask>,
        cancel: CancellationToken,
    }

    #[async_trait::async_trait]
    impl nizima_fetch::core::task::PipelineTask for CancellingTask {
        fn id(&self) -> &str {
            self.inner.id()
        }

        fn depends_on(&self) -> &[String] {
            self.inner.depends_on()
        }

        async fn is_done(&self) -> bool {
            false
        }

        async fn execute(
            &self,
            model_name: Option<&str>,
        ) -> nizima_fetch::Result<nizima_fetch::core::task::TaskOutput> {
            self.cancel.cancel();
            self.inner.execute(model_name).await
        }
    }

    let mut graph = TaskGraph::new();
    graph.add(Arc::new(CancellingTask {
        inner: RecordingTask::new("root", &[], &log),
        cancel: cancel.clone(),
    }));
    graph.add(RecordingTask::new("next", &["root"], &log));

    let outcome = Scheduler::new(shared(graph), 2, cancel)
        .run()
        .await
        .unwrap();
    assert_eq!(outcome, DrainOutcome::Cancelled);

    let log = log.lock().unwrap().clone();
    assert_eq!(log, vec!["root".to_string()]);
}
