//! Scheduler for bounded-concurrency execution of a task graph.
//!
//! Drives a validated [`TaskGraph`] to completion in waves: every ready task
//! is launched concurrently, each behind one of the admission gate's permits,
//! and the next wave is computed once the current one has drained. A task is
//! never started before all of its declared dependencies have completed;
//! tasks with no dependency relationship interleave freely.

use crate::core::graph::TaskGraph;
use crate::core::task::{PipelineTask, TaskOutput};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Terminal outcome of draining one task graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every task reached the completed state.
    Completed,
    /// One or more tasks failed permanently; their descendants never ran,
    /// unrelated branches finished normally.
    Failed { failed: Vec<String> },
    /// Cancellation was observed at a wave boundary; in-flight work drained,
    /// no new work was admitted.
    Cancelled,
    /// The ready set emptied with no failures recorded. Unreachable for a
    /// validated acyclic graph; surfaced as an invariant violation.
    Stuck { blocked: Vec<String> },
}

/// Wave scheduler over a shared task graph.
///
/// The graph's task map is mutated only through this type; in-flight tasks
/// take read locks for dependency-result lookup, which is safe because
/// results are write-once-then-immutable.
pub struct Scheduler {
    graph: Arc<RwLock<TaskGraph>>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        graph: Arc<RwLock<TaskGraph>>,
        max_concurrent: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            graph,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel,
        }
    }

    /// Drain the graph to a terminal outcome.
    ///
    /// Refuses to execute a structurally invalid graph: every referential
    /// error and any cycle is reported before a single task runs.
    pub async fn run(&self) -> Result<DrainOutcome> {
        {
            let graph = self.graph.read().await;
            let errors = graph.validate();
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(Error::Validation(joined));
            }
            info!(tasks = graph.len(), "executing task graph");
        }

        loop {
            if self.cancel.is_cancelled() {
                info!("cancellation observed; no further tasks admitted");
                return Ok(DrainOutcome::Cancelled);
            }

            let (ready, done) = {
                let graph = self.graph.read().await;
                (graph.ready_ids(), graph.all_done())
            };

            if done {
                let stats = self.graph.read().await.stats();
                info!(completed = stats.completed, total = stats.total, "task graph complete");
                return Ok(DrainOutcome::Completed);
            }

            if ready.is_empty() {
                let graph = self.graph.read().await;
                let failed = graph.failed_ids();
                if !failed.is_empty() {
                    warn!(?failed, "graph drained with permanently failed tasks");
                    return Ok(DrainOutcome::Failed { failed });
                }
                let blocked = graph.pending_ids();
                warn!(?blocked, "no ready tasks but graph is incomplete");
                return Ok(DrainOutcome::Stuck { blocked });
            }

            debug!(wave = ready.len(), "launching ready wave");
            let outcomes =
                futures::future::join_all(ready.iter().map(|id| self.run_one(id))).await;
            for outcome in outcomes {
                // Only fatal internal errors propagate; ordinary task
                // failures were recorded on their nodes.
                outcome?;
            }
        }
    }

    /// Run a single ready task behind one admission permit.
    async fn run_one(&self, id: &str) -> Result<()> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| Error::TaskJoin("admission gate closed".to_string()))?;

        // Re-check state now that a slot is held: the task may have been
        // satisfied by recovered state between wave computation and here.
        let task: Arc<dyn PipelineTask> = {
            let graph = self.graph.read().await;
            if graph.is_completed(id) {
                debug!(task = id, "already completed; skipping");
                return Ok(());
            }
            for dep in graph.dependencies_of(id) {
                if graph.contains(&dep) && !graph.is_completed(&dep) {
                    // Scheduling invariant violation, not a task failure.
                    return Err(Error::DependencyViolation {
                        task: id.to_string(),
                        dep,
                    });
                }
            }
            match graph.task(id) {
                Some(task) => task,
                None => return Ok(()),
            }
        };

        if task.is_done().await {
            let recovered = task.recover().await.unwrap_or(TaskOutput::None);
            info!(task = id, "output already present; skipping execution");
            let mut graph = self.graph.write().await;
            graph.mark_completed(id, recovered);
            return Ok(());
        }

        let model_name = if task.consumes_model_name() {
            let graph = self.graph.read().await;
            resolve_model_name(&graph, task.as_ref())
        } else {
            None
        };

        debug!(task = id, "executing");
        match task.execute(model_name.as_deref()).await {
            Ok(output) => {
                info!(task = id, "task completed");
                let mut graph = self.graph.write().await;
                graph.mark_completed(id, output);
            }
            Err(err) => {
                warn!(task = id, error = %err, "task failed");
                let mut graph = self.graph.write().await;
                graph.mark_failed(id, &err.to_string());
            }
        }
        Ok(())
    }
}

/// Resolve the model name a consuming task asked for by scanning its own
/// completed dependencies' results in declaration order.
fn resolve_model_name(graph: &TaskGraph, task: &dyn PipelineTask) -> Option<String> {
    task.depends_on().iter().find_map(|dep| {
        graph
            .output_of(dep)
            .and_then(|output| output.model_name().map(str::to_string))
    })
}
