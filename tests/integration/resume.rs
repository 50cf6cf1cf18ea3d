//! Incremental re-runs: durable `is_done` probes skip finished work.

use crate::fixtures::FileStepTask;
use nizima_fetch::core::graph::TaskGraph;
use nizima_fetch::core::scheduler::{DrainOutcome, Scheduler};
use nizima_fetch::core::task::TaskOutput;
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

struct Chain {
    graph: Arc<RwLock<TaskGraph>>,
    tasks: Vec<Arc<FileStepTask>>,
}

/// download → decrypt → extract over one shared work dir. Fresh task
/// instances each time, exactly as a new process would build them.
fn build_chain(work_dir: &Path) -> Chain {
    let tasks = vec![
        FileStepTask::new("download", &[], work_dir),
        FileStepTask::new("decrypt", &["download"], work_dir),
        FileStepTask::new("extract", &["decrypt"], work_dir),
    ];
    let mut graph = TaskGraph::new();
    for task in &tasks {
        graph.add(Arc::clone(task) as Arc<dyn nizima_fetch::core::task::PipelineTask>);
    }
    Chain {
        graph: Arc::new(RwLock::new(graph)),
        tasks,
    }
}

async fn drain(graph: Arc<RwLock<TaskGraph>>) -> DrainOutcome {
    Scheduler::new(graph, 4, CancellationToken::new())
        .run()
        .await
        .unwrap()
}

fn executions(chain: &Chain) -> Vec<usize> {
    chain
        .tasks
        .iter()
        .map(|task| task.executions.load(Ordering::SeqCst))
        .collect()
}

#[tokio::test]
async fn test_second_run_executes_nothing() {
    let dir = tempfile::TempDir::new().unwrap();

    let first = build_chain(dir.path());
    assert_eq!(drain(Arc::clone(&first.graph)).await, DrainOutcome::Completed);
    assert_eq!(executions(&first), vec![1, 1, 1]);

    // A fresh process over the same state: every probe short-circuits.
    let second = build_chain(dir.path());
    assert_eq!(
        drain(Arc::clone(&second.graph)).await,
        DrainOutcome::Completed
    );
    assert_eq!(executions(&second), vec![0, 0, 0]);
}

#[tokio::test]
async fn test_second_run_leaves_outputs_identical() {
    let dir = tempfile::TempDir::new().unwrap();

    let first = build_chain(dir.path());
    drain(Arc::clone(&first.graph)).await;
    let before: Vec<String> = first
        .tasks
        .iter()
        .map(|task| fs::read_to_string(task.output_path()).unwrap())
        .collect();

    let second = build_chain(dir.path());
    drain(Arc::clone(&second.graph)).await;
    let after: Vec<String> = second
        .tasks
        .iter()
        .map(|task| fs::read_to_string(task.output_path()).unwrap())
        .collect();

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_interrupted_state_resumes_where_it_stopped() {
    let dir = tempfile::TempDir::new().unwrap();

    // Simulate a crash after the first step: only its artifact exists.
    fs::write(dir.path().join("download.out"), "output of download").unwrap();

    let chain = build_chain(dir.path());
    assert_eq!(drain(Arc::clone(&chain.graph)).await, DrainOutcome::Completed);

    // download was satisfied from disk, the rest ran.
    assert_eq!(executions(&chain), vec![0, 1, 1]);
}

#[tokio::test]
async fn test_skipped_task_still_publishes_a_payload() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("download.out"), "output of download").unwrap();

    let chain = build_chain(dir.path());
    drain(Arc::clone(&chain.graph)).await;

    // The recovered result is visible to the graph exactly as if the task
    // had executed.
    let graph = chain.graph.read().await;
    assert_eq!(
        graph.output_of("download"),
        Some(TaskOutput::File(dir.path().join("download.out")))
    );
}
