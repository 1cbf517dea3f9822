//! Task dependency graph for swarm execution.
//!
//! This module provides the TaskGraph structure that represents sub-task
//! dependencies as a directed graph, enabling staged parallel execution of
//! independent tasks.
//!
//! Validation at build time is structural only: duplicate ids and
//! dependency references that do not resolve within the submission are
//! rejected immediately. Cycles are *not* rejected here — the scheduler
//! detects them as an empty ready set with tasks remaining, so a self-cycle
//! and a multi-node cycle take the same path.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::SubTask;
use crate::error::{Error, Result};

/// The sub-task dependency graph.
///
/// TaskGraph uses petgraph's DiGraph with an edge from each dependency to
/// its dependent. An id index gives fast lookups by task id.
pub struct TaskGraph {
    /// The underlying directed graph.
    graph: DiGraph<SubTask, ()>,
    /// Index mapping from task id to NodeIndex for fast lookups.
    task_index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    /// Build a graph from one submission of sub-tasks.
    ///
    /// # Errors
    /// Returns an error if:
    /// - two tasks share an id
    /// - a `depends_on` entry names an id not in this submission
    pub fn build(tasks: Vec<SubTask>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut task_index = HashMap::new();

        for task in tasks {
            if task_index.contains_key(&task.id) {
                return Err(Error::Validation(format!(
                    "Duplicate task id in graph: {}",
                    task.id
                )));
            }
            let id = task.id.clone();
            let index = graph.add_node(task);
            task_index.insert(id, index);
        }

        // Resolve dependency edges. Unresolved references are a
        // configuration bug, distinct from a cycle, and fail fast.
        let indices: Vec<NodeIndex> = graph.node_indices().collect();
        for index in indices {
            let (task_id, deps) = {
                let task = &graph[index];
                (task.id.clone(), task.depends_on.clone())
            };
            for dep in deps {
                let dep_index = task_index.get(&dep).ok_or_else(|| {
                    Error::UnresolvedDependency {
                        task: task_id.clone(),
                        reference: dep.clone(),
                    }
                })?;
                graph.add_edge(*dep_index, index, ());
            }
        }

        Ok(Self { graph, task_index })
    }

    /// Get a reference to a task by its id.
    pub fn get(&self, id: &str) -> Option<&SubTask> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Whether the graph contains a task with the given id.
    pub fn contains(&self, id: &str) -> bool {
        self.task_index.contains_key(id)
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All task ids in the graph.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.task_index.keys()
    }

    /// Get all tasks ready to execute against a completed set.
    ///
    /// A task is ready if every dependency (incoming edge) is in the
    /// completed set and the task itself is not. Together with the
    /// scheduler's loop this makes each stage the maximal set of
    /// runnable tasks.
    pub fn ready_tasks<'a>(&'a self, completed: &HashSet<String>) -> Vec<&'a SubTask> {
        self.graph
            .node_indices()
            .filter_map(|index| {
                let task = self.graph.node_weight(index)?;

                if completed.contains(&task.id) {
                    return None;
                }

                let deps_satisfied = self
                    .graph
                    .neighbors_directed(index, petgraph::Direction::Incoming)
                    .all(|dep_index| {
                        self.graph
                            .node_weight(dep_index)
                            .map(|dep| completed.contains(&dep.id))
                            .unwrap_or(false)
                    });

                if deps_satisfied {
                    Some(task)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Whether every task is in the completed set.
    pub fn all_complete(&self, completed: &HashSet<String>) -> bool {
        self.task_index.keys().all(|id| completed.contains(id))
    }

    /// Ids of tasks not yet in the completed set, sorted for stable
    /// error reporting.
    pub fn pending_ids(&self, completed: &HashSet<String>) -> Vec<String> {
        let mut pending: Vec<String> = self
            .task_index
            .keys()
            .filter(|id| !completed.contains(*id))
            .cloned()
            .collect();
        pending.sort();
        pending
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
