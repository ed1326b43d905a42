//! Execution planning over the task graph.
//!
//! The engine turns a validated [`TaskGraph`] into dependency generations
//! ("phases"), computes the critical path, and assigns tasks to sessions.

use crate::dag::builder::{DagBuilder, TaskGraph};
use crate::errors::DagError;
use crate::tasklist::Task;
use std::collections::HashSet;

/// Name of phase `i` as used in state documents and checkpoints.
pub fn phase_name(index: usize) -> String {
    format!("phase-{}", index)
}

/// The execution plan: graph plus derived phases and session assignment.
#[derive(Debug, Clone)]
pub struct DagEngine {
    graph: TaskGraph,
    /// Task ids per phase, lexicographically sorted within each phase.
    phases: Vec<Vec<String>>,
}

impl DagEngine {
    /// Build and validate the plan from a parsed task list.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self, DagError> {
        let graph = DagBuilder::new(tasks).build()?;
        let phases = Self::compute_phases(&graph);
        Ok(Self { graph, phases })
    }

    /// Compute dependency generations: phase `i` holds exactly the tasks
    /// whose dependencies all live in phases `0..i`. Ids are sorted within
    /// each phase so the plan is a pure function of its input.
    fn compute_phases(graph: &TaskGraph) -> Vec<Vec<String>> {
        let mut phases = Vec::new();
        let mut placed: HashSet<usize> = HashSet::new();

        loop {
            let mut ready: Vec<String> = graph
                .tasks()
                .iter()
                .enumerate()
                .filter(|(i, _)| {
                    !placed.contains(i) && graph.dependencies_satisfied(*i, &placed)
                })
                .map(|(_, task)| task.id.clone())
                .collect();

            if ready.is_empty() {
                break;
            }
            ready.sort();

            for id in &ready {
                if let Some(idx) = graph.index_of(id) {
                    placed.insert(idx);
                }
            }
            phases.push(ready);
        }

        phases
    }

    /// The underlying graph.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// All tasks in input order.
    pub fn tasks(&self) -> &[Task] {
        self.graph.tasks()
    }

    /// Number of tasks in the plan.
    pub fn task_count(&self) -> usize {
        self.graph.len()
    }

    /// The phase list.
    pub fn phases(&self) -> &[Vec<String>] {
        &self.phases
    }

    /// Number of phases.
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Task ids of phase `index`.
    pub fn phase_tasks(&self, index: usize) -> Result<&[String], DagError> {
        self.phases
            .get(index)
            .map(Vec::as_slice)
            .ok_or(DagError::PhaseOutOfRange {
                index,
                count: self.phases.len(),
            })
    }

    /// Look up a task by id.
    pub fn get_task(&self, id: &str) -> Result<&Task, DagError> {
        self.graph
            .get_by_id(id)
            .ok_or_else(|| DagError::UnknownTask { id: id.to_string() })
    }

    /// All tasks assigned to session `session`, in phase order.
    pub fn session_tasks(&self, session: usize) -> Vec<&Task> {
        self.phases
            .iter()
            .flatten()
            .filter_map(|id| self.graph.get_by_id(id))
            .filter(|task| task.session == Some(session))
            .collect()
    }

    /// The longest dependency chain by node count, as task ids from root to
    /// leaf. Ties are broken toward lexicographically smaller ids so the
    /// result is deterministic. Empty input yields an empty path.
    pub fn critical_path(&self) -> Vec<String> {
        let n = self.graph.len();
        if n == 0 {
            return Vec::new();
        }

        let mut chain_len = vec![0usize; n];
        let mut pred: Vec<Option<usize>> = vec![None; n];

        // Phases are already a topological order.
        for phase in &self.phases {
            for id in phase {
                let Some(idx) = self.graph.index_of(id) else {
                    continue;
                };
                let mut best_len = 0;
                let mut best_pred: Option<usize> = None;
                for &dep in self.graph.dependencies(idx) {
                    let candidate = chain_len[dep];
                    let better = candidate > best_len
                        || (candidate == best_len
                            && best_pred.is_some_and(|p| {
                                self.graph.get(dep).map(|t| t.id.as_str())
                                    < self.graph.get(p).map(|t| t.id.as_str())
                            }));
                    if best_pred.is_none() || better {
                        best_len = candidate;
                        best_pred = Some(dep);
                    }
                }
                chain_len[idx] = 1 + best_len;
                pred[idx] = best_pred;
            }
        }

        let end = (0..n)
            .max_by(|&a, &b| {
                chain_len[a]
                    .cmp(&chain_len[b])
                    .then_with(|| self.graph.get(b).unwrap().id.cmp(&self.graph.get(a).unwrap().id))
            })
            .expect("non-empty graph has an end node");

        let mut path = Vec::new();
        let mut current = Some(end);
        while let Some(idx) = current {
            if let Some(task) = self.graph.get(idx) {
                path.push(task.id.clone());
            }
            current = pred[idx];
        }
        path.reverse();
        path
    }

    /// Assign every task to a session.
    ///
    /// Within a phase, tasks are visited in sorted-id order. A phase runs
    /// round-robin across the `num_sessions` sessions only when every task in
    /// it is marked parallelizable; one sequential task serializes the whole
    /// phase onto session 0.
    pub fn assign_sessions(&mut self, num_sessions: usize) {
        let num_sessions = num_sessions.max(1);
        for phase in &self.phases {
            let all_parallel = phase
                .iter()
                .filter_map(|id| self.graph.get_by_id(id))
                .all(|task| task.parallelizable);

            for (k, id) in phase.iter().enumerate() {
                if let Some(task) = self.graph.get_by_id_mut(id) {
                    task.session = Some(if all_parallel { k % num_sessions } else { 0 });
                }
            }
        }
    }
}
