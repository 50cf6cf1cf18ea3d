//! Task contract for the execution DAG.
//!
//! Every pipeline step implements [`PipelineTask`]: an identifier, a frozen
//! dependency list, an idempotency probe and the work itself. The scheduler
//! is agnostic to which variant it runs.

use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Result payload published by a completed task and readable by dependents.
///
/// Payloads are write-once: the scheduler stores them on the owning graph
/// node at completion and they are never mutated afterwards, so in-flight
/// tasks may read them concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    /// A file produced on disk.
    File(PathBuf),
    /// An extracted directory tree plus the model name discovered inside it.
    Extracted {
        dir: PathBuf,
        model_name: Option<String>,
    },
    /// The side effect itself is the result.
    None,
}

impl TaskOutput {
    /// The model name carried by this payload, if any.
    pub fn model_name(&self) -> Option<&str> {
        match self {
            TaskOutput::Extracted { model_name, .. } => model_name.as_deref(),
            _ => None,
        }
    }
}

/// A unit of pipeline work.
///
/// `is_done` must be recomputable by a fresh process: it probes durable
/// filesystem state, never in-memory flags. `execute` must not leave a
/// partially-written artifact in a state that `is_done` would mistake for
/// valid.
#[async_trait]
pub trait PipelineTask: Send + Sync {
    /// Unique identifier within one item's graph.
    fn id(&self) -> &str;

    /// Identifiers of the tasks that must complete before this one starts.
    /// Frozen at construction.
    fn depends_on(&self) -> &[String];

    /// Whether the task's expected output already exists and looks valid.
    async fn is_done(&self) -> bool;

    /// Perform the work. `model_name` is populated only for variants that
    /// report [`PipelineTask::consumes_model_name`].
    async fn execute(&self, model_name: Option<&str>) -> Result<TaskOutput>;

    /// Re-derive a result payload from durable state after `is_done`
    /// short-circuits execution, for downstream tasks that need one.
    async fn recover(&self) -> Option<TaskOutput> {
        None
    }

    /// Whether this variant consumes the model name discovered by an
    /// upstream dependency. The scheduler queries this capability instead of
    /// inspecting concrete task types.
    fn consumes_model_name(&self) -> bool {
        false
    }
}
