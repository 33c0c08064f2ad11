//! Cycle detection for the task dependency graph.
//!
//! # Overview
//!
//! An edge `u → v` means "task `u` depends on task `v`". A dependency
//! addition is accepted only if the graph stays acyclic, so every dependency
//! mutation is gated on [`would_create_cycle`] before its transaction opens.
//!
//! # Design
//!
//! - **Explicit DFS**: the traversal keeps its own `visited` set, its own
//!   `on_path` set and an explicit frame stack. Correctness never depends on
//!   the language call stack, so deep chains cannot overflow it.
//! - **Whole project**: callers pass the complete current task set of the
//!   owning project. A partial set yields false negatives.
//! - **Stale ids**: dependencies on tasks that no longer exist are plain
//!   leaf nodes.
//! - **O(V+E)**: each node and edge is visited at most once per check.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::Task;

// ---------------------------------------------------------------------------
// CycleError
// ---------------------------------------------------------------------------

/// Rejection raised when a dependency addition would close a cycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("adding dependency '{dependency_id}' to task '{task_id}' would create a cycle")]
pub struct CycleError {
    pub task_id: String,
    pub dependency_id: String,
}

impl CycleError {
    /// Returns `true` if the rejected edge pointed at the task itself.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.task_id == self.dependency_id
    }
}

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

/// Adjacency view over a project's tasks (`task → tasks it depends on`).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from every task's current `dependencies` list.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = Self::default();
        for task in tasks {
            graph.set_dependencies(&task.id, task.dependencies.clone());
        }
        graph
    }

    /// Replace the outgoing edges of `task_id`.
    pub fn set_dependencies(&mut self, task_id: &str, deps: Vec<String>) {
        self.edges.insert(task_id.to_string(), deps);
    }

    /// Add a single edge `from → to`.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
    }

    /// Direct dependencies of `task_id` (empty for unknown or stale ids).
    #[must_use]
    pub fn dependencies_of(&self, task_id: &str) -> &[String] {
        self.edges.get(task_id).map_or(&[], Vec::as_slice)
    }

    /// Depth-first search from `start` that reports whether any node on the
    /// current path is revisited (a back edge).
    #[must_use]
    pub fn has_cycle_from(&self, start: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_path: HashSet<&str> = HashSet::new();
        // Each frame is (node, index of the next neighbour to explore).
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        visited.insert(start);
        on_path.insert(start);

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let neighbours = self.dependencies_of(node);

            if let Some(neighbour) = neighbours.get(next) {
                frame.1 += 1;
                let neighbour = neighbour.as_str();
                if on_path.contains(neighbour) {
                    return true;
                }
                if visited.insert(neighbour) {
                    on_path.insert(neighbour);
                    stack.push((neighbour, 0));
                }
            } else {
                on_path.remove(node);
                stack.pop();
            }
        }

        false
    }

    /// Returns `true` if `to` is reachable from `from` by following one or
    /// more dependency edges.
    #[must_use]
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self
            .dependencies_of(from)
            .iter()
            .map(String::as_str)
            .collect();

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if visited.insert(node) {
                stack.extend(self.dependencies_of(node).iter().map(String::as_str));
            }
        }

        false
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Would adding the edge `task_id → candidate_id` create a cycle?
///
/// Self-dependency is always a cycle. Otherwise the hypothetical edge is
/// added to the graph built from `tasks` and a DFS from `task_id` looks for a
/// back edge.
#[must_use]
pub fn would_create_cycle(task_id: &str, candidate_id: &str, tasks: &[Task]) -> bool {
    if task_id == candidate_id {
        return true;
    }

    let mut graph = DependencyGraph::from_tasks(tasks);
    graph.add_edge(task_id, candidate_id);
    graph.has_cycle_from(task_id)
}

/// Every id that may not be offered as a new dependency of `task_id`: the
/// task itself plus each task that would close a cycle.
///
/// Intended for interactive selection. The authoritative check is
/// [`would_create_cycle`] applied per candidate at commit time.
#[must_use]
pub fn invalid_dependencies(task_id: &str, tasks: &[Task]) -> BTreeSet<String> {
    let mut invalid = BTreeSet::new();
    invalid.insert(task_id.to_string());

    for task in tasks {
        if task.id != task_id && would_create_cycle(task_id, &task.id, tasks) {
            invalid.insert(task.id.clone());
        }
    }

    invalid
}

/// Validate replacing the dependencies of `task_id` with `next`.
///
/// Only entries not already in `current` are checked; removals never need a
/// check. Each addition is checked against a graph where the task keeps its
/// retained dependencies plus the additions accepted so far, so the result
/// reflects the final dependency list rather than a stale one.
///
/// # Errors
///
/// Returns the first [`CycleError`] encountered.
pub fn check_dependency_change(
    task_id: &str,
    current: &[String],
    next: &[String],
    tasks: &[Task],
) -> Result<(), CycleError> {
    let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
    let (retained, added): (Vec<&String>, Vec<&String>) = next
        .iter()
        .partition(|dep| current_set.contains(dep.as_str()));

    if added.is_empty() {
        return Ok(());
    }

    let mut graph = DependencyGraph::from_tasks(tasks);
    let mut accepted: Vec<String> = retained.into_iter().cloned().collect();

    for candidate in added {
        if candidate == task_id {
            return Err(CycleError {
                task_id: task_id.to_string(),
                dependency_id: candidate.clone(),
            });
        }

        graph.set_dependencies(task_id, accepted.clone());
        graph.add_edge(task_id, candidate);
        if graph.has_cycle_from(task_id) {
            return Err(CycleError {
                task_id: task_id.to_string(),
                dependency_id: candidate.clone(),
            });
        }
        accepted.push(candidate.clone());
    }

    Ok(())
}
