//! Graph construction from a parsed task list.
//!
//! The builder validates structure up front: duplicate ids and references to
//! unknown tasks are rejected before a graph exists, and cycles are rejected
//! before the graph is handed to the engine.

use crate::errors::DagError;
use crate::tasklist::Task;
use std::collections::{HashMap, HashSet};

/// Index into the task list.
pub type TaskIndex = usize;

/// A directed acyclic graph of tasks. Edges run dependency -> dependent.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Tasks indexed by their position in the input list.
    tasks: Vec<Task>,
    /// Map from task id to index.
    index_map: HashMap<String, TaskIndex>,
    /// Forward edges: index -> tasks that depend on it.
    forward_edges: Vec<Vec<TaskIndex>>,
    /// Reverse edges: index -> tasks it depends on.
    reverse_edges: Vec<Vec<TaskIndex>>,
}

impl TaskGraph {
    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Get a task by its index.
    pub fn get(&self, index: TaskIndex) -> Option<&Task> {
        self.tasks.get(index)
    }

    /// Get a task by its id.
    pub fn get_by_id(&self, id: &str) -> Option<&Task> {
        self.index_map.get(id).and_then(|&i| self.tasks.get(i))
    }

    /// Get a mutable task by its id.
    pub fn get_by_id_mut(&mut self, id: &str) -> Option<&mut Task> {
        let index = *self.index_map.get(id)?;
        self.tasks.get_mut(index)
    }

    /// Get the index for a task id.
    pub fn index_of(&self, id: &str) -> Option<TaskIndex> {
        self.index_map.get(id).copied()
    }

    /// All tasks in input order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Tasks that depend on the given task.
    pub fn dependents(&self, index: TaskIndex) -> &[TaskIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Tasks the given task depends on.
    pub fn dependencies(&self, index: TaskIndex) -> &[TaskIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Check if all dependencies of a task are in `completed`.
    pub fn dependencies_satisfied(
        &self,
        index: TaskIndex,
        completed: &HashSet<TaskIndex>,
    ) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| completed.contains(dep))
    }

    /// Find a dependency cycle, if one exists.
    ///
    /// Runs Kahn's algorithm; if any node survives, walks the residual graph
    /// to produce a concrete cycle path `a -> b -> ... -> a`. The walk picks
    /// the lexicographically smallest id at each step so the reported path is
    /// deterministic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut in_degree: Vec<usize> = self.reverse_edges.iter().map(Vec::len).collect();

        let mut queue: Vec<TaskIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;
        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in self.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed == self.len() {
            return None;
        }

        // Residual nodes all lie on or lead into a cycle; walking forward
        // edges restricted to the residual set must revisit a node.
        let residual: HashSet<TaskIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg > 0)
            .map(|(i, _)| i)
            .collect();

        let start = residual
            .iter()
            .copied()
            .min_by_key(|&i| &self.tasks[i].id)?;

        let mut path: Vec<TaskIndex> = vec![start];
        let mut on_path: HashMap<TaskIndex, usize> = HashMap::from([(start, 0)]);
        let mut current = start;

        loop {
            let next = self
                .dependents(current)
                .iter()
                .copied()
                .filter(|i| residual.contains(i))
                .min_by_key(|&i| &self.tasks[i].id)?;

            if let Some(&first) = on_path.get(&next) {
                let mut cycle: Vec<String> =
                    path[first..].iter().map(|&i| self.tasks[i].id.clone()).collect();
                cycle.push(self.tasks[next].id.clone());
                return Some(cycle);
            }

            on_path.insert(next, path.len());
            path.push(next);
            current = next;
        }
    }
}

/// Builder for task graphs.
pub struct DagBuilder {
    tasks: Vec<Task>,
}

impl DagBuilder {
    /// Create a new builder with the given tasks.
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Build the task graph.
    ///
    /// Rejects duplicate ids, references to unknown tasks, and cyclic
    /// dependency structures (a self-reference is a one-node cycle).
    pub fn build(self) -> Result<TaskGraph, DagError> {
        let mut index_map = HashMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            if index_map.contains_key(&task.id) {
                return Err(DagError::DuplicateTask {
                    id: task.id.clone(),
                });
            }
            index_map.insert(task.id.clone(), i);
        }

        let mut forward_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];
        let mut reverse_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];

        for (to_idx, task) in self.tasks.iter().enumerate() {
            for dep in &task.dependencies {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| DagError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                        })?;
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let graph = TaskGraph {
            tasks: self.tasks,
            index_map,
            forward_edges,
            reverse_edges,
        };

        if let Some(path) = graph.find_cycle() {
            return Err(DagError::Cycle { path });
        }

        Ok(graph)
    }
}
