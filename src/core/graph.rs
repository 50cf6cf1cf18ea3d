//! Task graph for dependency management.
//!
//! Holds one item's tasks keyed by identifier together with their per-run
//! state. Insertion order carries no meaning. Ready-set computation and
//! structural validation are the scheduler's inputs; state transitions are
//! only ever applied by the scheduler.

use crate::core::task::{PipelineTask, TaskOutput};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A structural problem detected before any execution begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A task names a dependency that is not present in the graph.
    MissingDependency { task: String, dep: String },
    /// The dependency relation contains a cycle reachable through this task.
    Cycle { task: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::MissingDependency { task, dep } => {
                write!(f, "task '{task}' depends on unknown task '{dep}'")
            }
            GraphError::Cycle { task } => {
                write!(f, "dependency cycle detected through task '{task}'")
            }
        }
    }
}

/// Counts used for reporting. Never consulted for control decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

struct TaskNode {
    task: Arc<dyn PipelineTask>,
    completed: bool,
    error: Option<String>,
    output: Option<TaskOutput>,
}

/// In-memory DAG of pipeline tasks keyed by identifier.
#[derive(Default)]
pub struct TaskGraph {
    nodes: HashMap<String, TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a task. A task with the same identifier is replaced.
    pub fn add(&mut self, task: Arc<dyn PipelineTask>) {
        self.nodes.insert(
            task.id().to_string(),
            TaskNode {
                task,
                completed: false,
                error: None,
                output: None,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Shared handle to a task, for execution outside the graph lock.
    pub fn task(&self, id: &str) -> Option<Arc<dyn PipelineTask>> {
        self.nodes.get(id).map(|node| Arc::clone(&node.task))
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.nodes
            .get(id)
            .map(|node| node.task.depends_on().to_vec())
            .unwrap_or_default()
    }

    /// Tasks naming `id` as a dependency. Introspection only; scheduling
    /// never consults this view.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.task.depends_on().iter().any(|dep| dep == id))
            .map(|(task_id, _)| task_id.clone())
            .collect()
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|node| node.completed)
    }

    pub fn error_of(&self, id: &str) -> Option<String> {
        self.nodes.get(id).and_then(|node| node.error.clone())
    }

    /// Write-once result payload of a completed task.
    pub fn output_of(&self, id: &str) -> Option<TaskOutput> {
        self.nodes.get(id).and_then(|node| node.output.clone())
    }

    /// Every incomplete, unfailed task whose dependencies (those present in
    /// the graph) are all completed.
    pub fn ready_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| !node.completed && node.error.is_none())
            .filter(|(_, node)| {
                node.task
                    .depends_on()
                    .iter()
                    .filter(|dep| self.nodes.contains_key(dep.as_str()))
                    .all(|dep| self.nodes[dep.as_str()].completed)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.nodes.values().all(|node| node.completed)
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.error.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| !node.completed && node.error.is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let total = self.nodes.len();
        let completed = self.nodes.values().filter(|node| node.completed).count();
        let failed = self
            .nodes
            .values()
            .filter(|node| node.error.is_some())
            .count();
        GraphStats {
            total,
            completed,
            failed,
            pending: total - completed - failed,
        }
    }

    /// Transition a task to completed, recording its result payload.
    ///
    /// Once set, the completion flag is only ever cleared by an explicit
    /// [`TaskGraph::mark_failed`] transition.
    pub fn mark_completed(&mut self, id: &str, output: TaskOutput) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.completed = true;
            node.error = None;
            node.output = Some(output);
        }
    }

    /// Transition a task to failed. A failed task is excluded from every
    /// later ready set, which permanently starves its downstream subtree.
    pub fn mark_failed(&mut self, id: &str, error: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.completed = false;
            node.error = Some(error.to_string());
        }
    }

    /// Check referential integrity and acyclicity.
    ///
    /// Returns one error per dependency edge naming an absent task, plus a
    /// single aggregate error if a cycle exists. An empty result is the
    /// precondition for execution.
    pub fn validate(&self) -> Vec<GraphError> {
        let mut errors = Vec::new();

        for (id, node) in &self.nodes {
            for dep in node.task.depends_on() {
                if !self.nodes.contains_key(dep) {
                    errors.push(GraphError::MissingDependency {
                        task: id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }
        errors.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));

        if let Some(task) = self.find_cycle() {
            errors.push(GraphError::Cycle { task });
        }

        errors
    }

    /// Three-color depth-first traversal over the dependency edges. A cycle
    /// is reported the moment an in-progress node is revisited.
    fn find_cycle(&self) -> Option<String> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut color: HashMap<&str, u8> =
            self.nodes.keys().map(|id| (id.as_str(), WHITE)).collect();

        for start in self.nodes.keys() {
            if color[start.as_str()] != WHITE {
                continue;
            }
            color.insert(start.as_str(), GRAY);
            // (node, index of the next dependency edge to follow)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

            while let Some((id, idx)) = stack.pop() {
                let deps = self.nodes[id].task.depends_on();
                if idx < deps.len() {
                    stack.push((id, idx + 1));
                    let dep = deps[idx].as_str();
                    match color.get(dep).copied() {
                        Some(GRAY) => return Some(dep.to_string()),
                        Some(WHITE) => {
                            color.insert(dep, GRAY);
                            stack.push((dep, 0));
                        }
                        // Finished node, or a missing dependency reported by
                        // the referential check.
                        _ => {}
                    }
                } else {
                    color.insert(id, BLACK);
                }
            }
        }

        None
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}
