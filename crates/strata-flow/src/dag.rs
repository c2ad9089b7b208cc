//! Job dependency graph.
//!
//! [`JobGraph`] holds the jobs of one asset pipeline as petgraph nodes, with
//! an edge from every parent to its child. Construction rejects duplicate
//! names, unknown parents and cycles, so a built graph always has a valid
//! submission order.

use std::collections::{HashMap, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::{Error, Result};
use crate::job::Job;

/// Directed acyclic graph of jobs keyed by job name.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    graph: DiGraph<Job, ()>,
    index_map: HashMap<String, NodeIndex>,
}

impl JobGraph {
    /// Builds a graph from jobs whose `parents` name other jobs in the list.
    ///
    /// Parents may appear after their children in `jobs`; order only breaks
    /// ties in [`JobGraph::toposort`].
    ///
    /// # Errors
    ///
    /// - `InvalidCreationOptions` if two jobs share a name
    /// - `DagNodeNotFound` if a parent is not in the list
    /// - `CycleDetected` if the parent edges form a cycle
    pub fn from_jobs(jobs: Vec<Job>) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(jobs.len(), jobs.len());
        let mut index_map = HashMap::with_capacity(jobs.len());

        for job in jobs {
            if index_map.contains_key(&job.name) {
                return Err(Error::invalid_options(format!(
                    "duplicate job name '{}'",
                    job.name
                )));
            }
            let name = job.name.clone();
            let idx = graph.add_node(job);
            index_map.insert(name, idx);
        }

        let mut edges = Vec::new();
        for child in graph.node_indices() {
            let Some(job) = graph.node_weight(child) else {
                continue;
            };
            for parent in &job.parents {
                let parent_idx =
                    index_map
                        .get(parent)
                        .copied()
                        .ok_or_else(|| Error::DagNodeNotFound {
                            node: format!("{parent} (parent of {})", job.name),
                        })?;
                edges.push((parent_idx, child));
            }
        }
        for (parent, child) in edges {
            graph.add_edge(parent, child, ());
        }

        let built = Self { graph, index_map };
        built.order()?;
        Ok(built)
    }

    /// Returns the number of jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true if the graph has no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Looks up a job by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Job> {
        self.index_map
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Returns jobs in submission order: every parent precedes its children.
    ///
    /// Kahn's algorithm; among ready jobs, the one added first wins, so the
    /// order is deterministic.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if the graph contains a cycle.
    pub fn toposort(&self) -> Result<Vec<&Job>> {
        Ok(self
            .order()?
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect())
    }

    /// Consumes the graph and returns owned jobs in submission order.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if the graph contains a cycle.
    pub fn into_ordered(self) -> Result<Vec<Job>> {
        let order = self.order()?;
        let (nodes, _) = self.graph.into_nodes_edges();
        let mut slots: Vec<Option<Job>> = nodes.into_iter().map(|node| Some(node.weight)).collect();
        Ok(order
            .into_iter()
            .filter_map(|idx| slots.get_mut(idx.index()).and_then(Option::take))
            .collect())
    }

    /// Names of the direct parents of a job, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `DagNodeNotFound` if the job is not in the graph.
    pub fn upstream(&self, name: &str) -> Result<Vec<&str>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Names of the direct children of a job, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `DagNodeNotFound` if the job is not in the graph.
    pub fn downstream(&self, name: &str) -> Result<Vec<&str>> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Jobs without parents, in insertion order.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx).map(|job| job.name.as_str()))
            .collect()
    }

    /// Largest number of parents any job has.
    #[must_use]
    pub fn max_fan_in(&self) -> usize {
        self.graph
            .node_indices()
            .map(|idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Result<Vec<&str>> {
        let idx = self
            .index_map
            .get(name)
            .copied()
            .ok_or_else(|| Error::DagNodeNotFound {
                node: name.to_string(),
            })?;
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort_unstable();
        neighbors.dedup();
        Ok(neighbors
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n).map(|job| job.name.as_str()))
            .collect())
    }

    // Node indices are assigned in insertion order and nodes are never
    // removed, so sorting by index is sorting by insertion order.
    fn order(&self) -> Result<Vec<NodeIndex>> {
        let node_count = self.graph.node_count();
        let mut in_degree = vec![0_usize; node_count];
        for edge in self.graph.edge_references() {
            if let Some(deg) = in_degree.get_mut(edge.target().index()) {
                *deg += 1;
            }
        }

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree.get(idx.index()).copied() == Some(0))
            .collect();
        let mut result = Vec::with_capacity(node_count);

        while let Some(idx) = queue.pop_front() {
            result.push(idx);

            let mut children: Vec<NodeIndex> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|edge| edge.target())
                .collect();
            children.sort_unstable();

            for child in children {
                if let Some(deg) = in_degree.get_mut(child.index()) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if result.len() != node_count {
            let cycle = self
                .graph
                .node_indices()
                .filter(|idx| in_degree.get(idx.index()).copied().unwrap_or(0) > 0)
                .filter_map(|idx| self.graph.node_weight(idx).map(|job| job.name.clone()))
                .collect();
            return Err(Error::CycleDetected { cycle });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;

    fn job(name: &str, parents: &[&str]) -> Job {
        Job::new(name, JobKind::DatabaseClient, Vec::new()).with_parents(parents.iter().copied())
    }

    fn names(jobs: &[&Job]) -> Vec<String> {
        jobs.iter().map(|j| j.name.clone()).collect()
    }

    #[test]
    fn empty_graph() {
        let graph = JobGraph::from_jobs(Vec::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.toposort().unwrap().is_empty());
    }

    #[test]
    fn parents_come_first_even_when_listed_later() {
        let graph = JobGraph::from_jobs(vec![
            job("index", &["enrich"]),
            job("enrich", &["load"]),
            job("load", &["schema"]),
            job("schema", &[]),
        ])
        .unwrap();
        let order = names(&graph.toposort().unwrap());
        assert_eq!(order, vec!["schema", "load", "enrich", "index"]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let graph = JobGraph::from_jobs(vec![
            job("schema", &[]),
            job("load_b", &["schema"]),
            job("load_a", &["schema"]),
            job("enrich", &["load_a", "load_b"]),
        ])
        .unwrap();
        let order = names(&graph.toposort().unwrap());
        assert_eq!(order, vec!["schema", "load_b", "load_a", "enrich"]);
        assert_eq!(graph.upstream("enrich").unwrap(), vec!["load_b", "load_a"]);
        assert_eq!(graph.downstream("schema").unwrap(), vec!["load_b", "load_a"]);
        assert_eq!(graph.roots(), vec!["schema"]);
        assert_eq!(graph.max_fan_in(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = JobGraph::from_jobs(vec![job("a", &[]), job("a", &[])]).unwrap_err();
        assert!(matches!(err, Error::InvalidCreationOptions { .. }));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let err = JobGraph::from_jobs(vec![job("a", &["missing"])]).unwrap_err();
        assert!(matches!(err, Error::DagNodeNotFound { .. }));
    }

    #[test]
    fn cycle_is_detected() {
        let err = JobGraph::from_jobs(vec![job("a", &["b"]), job("b", &["a"]), job("c", &[])])
            .unwrap_err();
        let Error::CycleDetected { cycle } = err else {
            panic!("expected cycle");
        };
        assert_eq!(cycle, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn into_ordered_returns_owned_jobs() {
        let graph = JobGraph::from_jobs(vec![job("b", &["a"]), job("a", &[])]).unwrap();
        let jobs = graph.into_ordered().unwrap();
        assert_eq!(jobs[0].name, "a");
        assert_eq!(jobs[1].name, "b");
    }
}
