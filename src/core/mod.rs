//! Execution engine: task contract, dependency graph, and scheduler.

pub mod graph;
pub mod scheduler;
pub mod task;

pub use graph::{GraphError, GraphStats, TaskGraph};
pub use scheduler::{DrainOutcome, Scheduler};
pub use task::{PipelineTask, TaskOutput};
