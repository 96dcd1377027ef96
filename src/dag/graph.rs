//! The job graph
//!
//! Nodes are jobs and source leaves. Job A depends on job B when an input
//! path of A is an output path of B. Jobs are stored in a topological order
//! (dependencies first) and [`Graph::topological_order`] re-derives one with
//! Kahn's algorithm, preferring lower job ids.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use super::job::Job;
use crate::error::{Result, RuleGraphError};

/// Index of a job in [`Graph::jobs`]
pub type JobId = usize;

/// A path no rule produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceNode {
    pub path: String,
    /// Existence when the graph was built; checked again before execution
    pub exists: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    targets: Vec<String>,
    jobs: Vec<Arc<Job>>,
    /// Per job: the jobs it depends on (sorted, deduplicated)
    dependencies: Vec<Vec<JobId>>,
    sources: Vec<SourceNode>,
    #[serde(skip)]
    producers: HashMap<String, JobId>,
    #[serde(skip)]
    dependents: Vec<Vec<JobId>>,
}

impl Graph {
    /// Assemble a graph from resolved jobs and sources.
    ///
    /// Fails when two jobs claim the same output path or the dependency
    /// edges form a cycle.
    pub fn from_parts(
        targets: Vec<String>,
        jobs: Vec<Arc<Job>>,
        sources: Vec<SourceNode>,
    ) -> Result<Self> {
        let mut producers: HashMap<String, JobId> = HashMap::new();
        for (id, job) in jobs.iter().enumerate() {
            for path in job.output_paths() {
                if let Some(&other) = producers.get(path) {
                    return Err(RuleGraphError::AmbiguousRule {
                        path: path.to_string(),
                        rules: vec![jobs[other].label(), job.label()],
                    });
                }
                producers.insert(path.to_string(), id);
            }
        }

        let mut dependencies = Vec::with_capacity(jobs.len());
        let mut dependents = vec![Vec::new(); jobs.len()];
        for (id, job) in jobs.iter().enumerate() {
            let mut deps: Vec<JobId> = job
                .input_paths()
                .filter_map(|p| producers.get(p).copied())
                .collect();
            deps.sort_unstable();
            deps.dedup();
            for &dep in &deps {
                dependents[dep].push(id);
            }
            dependencies.push(deps);
        }

        let graph = Self {
            targets,
            jobs,
            dependencies,
            sources,
            producers,
            dependents,
        };
        graph.detect_cycles()?;
        Ok(graph)
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id).map(|j| j.as_ref())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn sources(&self) -> &[SourceNode] {
        &self.sources
    }

    /// Sources that did not exist at build time
    pub fn missing_sources(&self) -> impl Iterator<Item = &SourceNode> {
        self.sources.iter().filter(|s| !s.exists)
    }

    /// Job producing `path`, if any
    pub fn producer_of(&self, path: &str) -> Option<JobId> {
        self.producers.get(path).copied()
    }

    pub fn dependencies(&self, id: JobId) -> &[JobId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn dependents(&self, id: JobId) -> &[JobId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// `(dependent, dependency)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (JobId, JobId)> + '_ {
        self.dependencies
            .iter()
            .enumerate()
            .flat_map(|(id, deps)| deps.iter().map(move |&dep| (id, dep)))
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(Vec::len).sum()
    }

    /// Jobs such that every job comes after all of its dependencies
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        let indegree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let ready = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| Reverse(id))
            .collect();
        TopologicalOrder {
            graph: self,
            indegree,
            ready,
        }
    }

    /// Three-color DFS over dependency edges; reports the first cycle as
    /// `a → b → a` using output paths
    fn detect_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs(
            node: JobId,
            graph: &Graph,
            colors: &mut [Color],
            stack: &mut Vec<JobId>,
        ) -> std::result::Result<(), Vec<JobId>> {
            colors[node] = Color::Gray;
            stack.push(node);

            for &dep in graph.dependencies(node) {
                match colors[dep] {
                    Color::Gray => {
                        let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(dep);
                        return Err(cycle);
                    }
                    Color::White => dfs(dep, graph, colors, stack)?,
                    Color::Black => {}
                }
            }

            stack.pop();
            colors[node] = Color::Black;
            Ok(())
        }

        let mut colors = vec![Color::White; self.jobs.len()];
        let mut stack = Vec::new();

        for id in 0..self.jobs.len() {
            if colors[id] == Color::White {
                if let Err(cycle) = dfs(id, self, &mut colors, &mut stack) {
                    let names: Vec<&str> = cycle
                        .iter()
                        .filter_map(|&id| self.jobs[id].output_paths().next())
                        .collect();
                    return Err(RuleGraphError::CyclicDependency {
                        cycle: names.join(" → "),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Kahn's algorithm; among ready jobs the lowest id goes first
pub struct TopologicalOrder<'a> {
    graph: &'a Graph,
    indegree: Vec<usize>,
    ready: BinaryHeap<Reverse<JobId>>,
}

impl<'a> Iterator for TopologicalOrder<'a> {
    type Item = (JobId, &'a Job);

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(id) = self.ready.pop()?;
        for &dependent in self.graph.dependents(id) {
            self.indegree[dependent] -= 1;
            if self.indegree[dependent] == 0 {
                self.ready.push(Reverse(dependent));
            }
        }
        Some((id, self.graph.jobs[id].as_ref()))
    }
}
