//! Dependency graph for tasks
//!
//! Mirrors the `dependencies` lists of a task collection as a petgraph
//! directed graph, for reachability (cycle prevention) and topological
//! ordering. The edge direction is `depends_on -> task`: a dependency
//! points at the work it unblocks.

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::id::TaskId;
use super::task::Task;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Adding dependency would create a cycle: {0} -> {1}")]
    CycleDetected(TaskId, TaskId),

    #[error("Dependency graph contains a cycle through {0}")]
    Cyclic(TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
}

/// A dependency graph for tasks
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph
    graph: DiGraph<TaskId, ()>,

    /// Map from TaskId to node index
    node_map: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds a graph from a collection of tasks
    ///
    /// Stored data is mirrored as-is: edges naming unknown tasks are skipped
    /// and no cycle check is applied, so loading never fails.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut graph = Self::new();

        // First pass: add all nodes
        let tasks: Vec<_> = tasks.into_iter().collect();
        for task in &tasks {
            graph.add_task(task.id.clone());
        }

        // Second pass: add all edges
        for task in &tasks {
            for dep_id in &task.dependencies {
                graph.link(&task.id, dep_id);
            }
        }

        graph
    }

    /// Adds a task to the graph
    pub fn add_task(&mut self, task_id: TaskId) {
        if !self.node_map.contains_key(&task_id) {
            let idx = self.graph.add_node(task_id.clone());
            self.node_map.insert(task_id, idx);
        }
    }

    /// Removes a set of tasks (and all their edges) from the graph
    ///
    /// Returns the number of nodes removed. The node map is rebuilt once,
    /// so removing a whole subtree stays linear in the graph size.
    pub fn remove_tasks(&mut self, task_ids: &HashSet<TaskId>) -> usize {
        let before = self.graph.node_count();
        self.graph.retain_nodes(|graph, idx| !task_ids.contains(&graph[idx]));
        let removed = before - self.graph.node_count();
        if removed > 0 {
            // petgraph moves the last node into each freed slot
            self.rebuild_node_map();
        }
        removed
    }

    /// Rebuilds the node map after removal
    fn rebuild_node_map(&mut self) {
        self.node_map.clear();
        for idx in self.graph.node_indices() {
            if let Some(task_id) = self.graph.node_weight(idx) {
                self.node_map.insert(task_id.clone(), idx);
            }
        }
    }

    /// Adds an edge without any checks; returns false if an endpoint is unknown
    fn link(&mut self, task: &TaskId, depends_on: &TaskId) -> bool {
        let (Some(&task_idx), Some(&dep_idx)) =
            (self.node_map.get(task), self.node_map.get(depends_on))
        else {
            return false;
        };
        if self.graph.find_edge(dep_idx, task_idx).is_none() {
            self.graph.add_edge(dep_idx, task_idx, ());
        }
        true
    }

    /// Returns true if `task` depending on `depends_on` would close a cycle
    ///
    /// That is the case when `task` is already reachable from `depends_on`
    /// by following dependencies, which includes `task == depends_on`.
    pub fn would_create_cycle(&self, task: &TaskId, depends_on: &TaskId) -> bool {
        if task == depends_on {
            return true;
        }
        match (self.node_map.get(task), self.node_map.get(depends_on)) {
            // depends_on reaches task along dependencies <=> a path task -> depends_on
            (Some(&task_idx), Some(&dep_idx)) => {
                has_path_connecting(&self.graph, task_idx, dep_idx, None)
            }
            _ => false,
        }
    }

    /// Adds a dependency edge: `task` depends on `depends_on`
    ///
    /// Rejects the edge if it would create a cycle; the graph is unchanged
    /// on error. Adding an existing edge is a no-op.
    pub fn add_dependency(&mut self, task: &TaskId, depends_on: &TaskId) -> Result<(), GraphError> {
        if !self.node_map.contains_key(task) {
            return Err(GraphError::TaskNotFound(task.clone()));
        }
        if !self.node_map.contains_key(depends_on) {
            return Err(GraphError::TaskNotFound(depends_on.clone()));
        }

        if self.would_create_cycle(task, depends_on) {
            return Err(GraphError::CycleDetected(task.clone(), depends_on.clone()));
        }

        self.link(task, depends_on);
        Ok(())
    }

    /// Removes a dependency edge
    pub fn remove_dependency(&mut self, task: &TaskId, depends_on: &TaskId) -> bool {
        let task_idx = match self.node_map.get(task) {
            Some(idx) => *idx,
            None => return false,
        };

        let dep_idx = match self.node_map.get(depends_on) {
            Some(idx) => *idx,
            None => return false,
        };

        if let Some(edge) = self.graph.find_edge(dep_idx, task_idx) {
            self.graph.remove_edge(edge);
            true
        } else {
            false
        }
    }

    /// Returns all tasks in topological order (dependencies before dependents)
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .filter_map(|idx| self.graph.node_weight(idx).cloned())
                .collect()),
            // Only reachable when loaded data was already cyclic
            Err(cycle) => Err(GraphError::Cyclic(self.graph[cycle.node_id()].clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::NewTask;

    fn make_task_id(seq: u32) -> TaskId {
        format!("task_{}", seq).parse().unwrap()
    }

    /// Direct dependencies of `id`, read off the incoming edges
    fn dependencies_of(graph: &DependencyGraph, id: &TaskId) -> Vec<TaskId> {
        let idx = graph.node_map[id];
        graph
            .graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|n| graph.graph[n].clone())
            .collect()
    }

    fn dependents_of(graph: &DependencyGraph, id: &TaskId) -> Vec<TaskId> {
        let idx = graph.node_map[id];
        graph
            .graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .map(|n| graph.graph[n].clone())
            .collect()
    }

    fn graph_with(n: u32) -> (DependencyGraph, Vec<TaskId>) {
        let mut graph = DependencyGraph::new();
        let ids: Vec<_> = (1..=n).map(make_task_id).collect();
        for id in &ids {
            graph.add_task(id.clone());
        }
        (graph, ids)
    }

    #[test]
    fn empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.node_map.is_empty());
        assert_eq!(graph.topological_order(), Ok(vec![]));
    }

    #[test]
    fn add_tasks() {
        let (graph, ids) = graph_with(2);

        assert_eq!(graph.node_map.len(), 2);
        assert!(graph.node_map.contains_key(&ids[0]));
        assert!(graph.node_map.contains_key(&ids[1]));
    }

    #[test]
    fn add_dependency() {
        let (mut graph, ids) = graph_with(2);

        // ids[1] depends on ids[0]
        graph.add_dependency(&ids[1], &ids[0]).unwrap();

        assert_eq!(dependencies_of(&graph, &ids[1]), vec![ids[0].clone()]);
        assert_eq!(dependents_of(&graph, &ids[0]), vec![ids[1].clone()]);
    }

    #[test]
    fn duplicate_edge_is_noop() {
        let (mut graph, ids) = graph_with(2);

        graph.add_dependency(&ids[1], &ids[0]).unwrap();
        graph.add_dependency(&ids[1], &ids[0]).unwrap();

        assert_eq!(graph.graph.edge_count(), 1);
    }

    #[test]
    fn direct_cycle_rejected() {
        let (mut graph, ids) = graph_with(2);

        graph.add_dependency(&ids[0], &ids[1]).unwrap();
        let result = graph.add_dependency(&ids[1], &ids[0]);

        assert!(matches!(result, Err(GraphError::CycleDetected(_, _))));
        assert_eq!(graph.graph.edge_count(), 1);
    }

    #[test]
    fn transitive_cycle_rejected() {
        let (mut graph, ids) = graph_with(3);
        let (a, b, c) = (&ids[0], &ids[1], &ids[2]);

        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, c).unwrap();

        assert!(graph.would_create_cycle(c, a));
        assert!(matches!(
            graph.add_dependency(c, a),
            Err(GraphError::CycleDetected(_, _))
        ));

        // Redundant but acyclic
        assert!(!graph.would_create_cycle(a, c));
        graph.add_dependency(a, c).unwrap();
    }

    #[test]
    fn self_dependency_rejected() {
        let (mut graph, ids) = graph_with(1);

        let result = graph.add_dependency(&ids[0], &ids[0]);
        assert!(matches!(result, Err(GraphError::CycleDetected(_, _))));
    }

    #[test]
    fn topological_order() {
        let (mut graph, ids) = graph_with(3);
        let (id1, id2, id3) = (&ids[0], &ids[1], &ids[2]);

        // id1 depends on id2, id2 depends on id3
        graph.add_dependency(id1, id2).unwrap();
        graph.add_dependency(id2, id3).unwrap();

        let order = graph.topological_order().unwrap();

        let pos3 = order.iter().position(|id| id == id3).unwrap();
        let pos2 = order.iter().position(|id| id == id2).unwrap();
        let pos1 = order.iter().position(|id| id == id1).unwrap();

        assert!(pos3 < pos2);
        assert!(pos2 < pos1);
    }

    #[test]
    fn remove_task() {
        let (mut graph, ids) = graph_with(3);
        graph.add_dependency(&ids[1], &ids[0]).unwrap();
        graph.add_dependency(&ids[2], &ids[1]).unwrap();

        assert_eq!(graph.remove_tasks(&HashSet::from([ids[0].clone()])), 1);
        assert!(!graph.node_map.contains_key(&ids[0]));
        assert!(dependencies_of(&graph, &ids[1]).is_empty());
        // Surviving edges keep pointing at the right tasks after reindexing
        assert_eq!(dependencies_of(&graph, &ids[2]), vec![ids[1].clone()]);
        assert_eq!(graph.remove_tasks(&HashSet::from([ids[0].clone()])), 0);
    }

    #[test]
    fn remove_many_tasks_reindexes_survivors() {
        let (mut graph, ids) = graph_with(6);
        for i in 1..6 {
            graph.add_dependency(&ids[i], &ids[i - 1]).unwrap();
        }

        let gone: HashSet<TaskId> = [&ids[0], &ids[2], &ids[3]].into_iter().cloned().collect();
        assert_eq!(graph.remove_tasks(&gone), 3);

        assert_eq!(graph.node_map.len(), 3);
        for (id, &idx) in &graph.node_map {
            assert_eq!(&graph.graph[idx], id);
        }
        assert!(dependencies_of(&graph, &ids[1]).is_empty());
        assert_eq!(dependencies_of(&graph, &ids[5]), vec![ids[4].clone()]);
        assert!(dependents_of(&graph, &ids[1]).is_empty());
    }

    #[test]
    fn remove_dependency() {
        let (mut graph, ids) = graph_with(2);
        graph.add_dependency(&ids[1], &ids[0]).unwrap();

        assert!(graph.remove_dependency(&ids[1], &ids[0]));
        assert!(dependencies_of(&graph, &ids[1]).is_empty());
        assert!(!graph.remove_dependency(&ids[1], &ids[0]));
    }

    #[test]
    fn from_tasks_skips_dangling_edges() {
        let task1 = Task::new(make_task_id(1), NewTask::new("Task 1"));
        let mut task2 = Task::new(make_task_id(2), NewTask::new("Task 2"));
        task2.add_dependency(task1.id.clone());
        task2.add_dependency(make_task_id(99));

        let graph = DependencyGraph::from_tasks([&task1, &task2]);

        assert_eq!(graph.node_map.len(), 2);
        assert_eq!(dependencies_of(&graph, &task2.id), vec![task1.id.clone()]);
    }

    #[test]
    fn cyclic_stored_data_reports_cycle_in_order() {
        let mut task1 = Task::new(make_task_id(1), NewTask::new("Task 1"));
        let mut task2 = Task::new(make_task_id(2), NewTask::new("Task 2"));
        task1.add_dependency(task2.id.clone());
        task2.add_dependency(task1.id.clone());

        let graph = DependencyGraph::from_tasks([&task1, &task2]);
        assert!(matches!(
            graph.topological_order(),
            Err(GraphError::Cyclic(_))
        ));
    }

    #[test]
    fn unknown_task_returns_error() {
        let (mut graph, ids) = graph_with(1);
        let missing = make_task_id(2);

        let result = graph.add_dependency(&ids[0], &missing);
        assert_eq!(result, Err(GraphError::TaskNotFound(missing)));
    }

    #[test]
    fn long_chain_reachability() {
        let (mut graph, ids) = graph_with(500);

        for i in 1..500 {
            graph.add_dependency(&ids[i], &ids[i - 1]).unwrap();
        }

        assert!(graph.would_create_cycle(&ids[0], &ids[499]));
        assert!(!graph.would_create_cycle(&ids[499], &ids[0]));
    }
}
