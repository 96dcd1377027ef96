//! DAG construction
//!
//! Two phases:
//! 1. Resolve: depth-first from each target, matching producers, resolving
//!    jobs and recording every visited path in a shared memo. The chain of
//!    in-progress `(path, job)` frames detects cycles.
//! 2. Assemble: walk the memo from the targets in order and emit jobs
//!    dependencies-first. This phase is sequential, so the graph is the same
//!    however phase 1 was scheduled.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::graph::{Graph, SourceNode};
use super::job::{Job, JobKey};
use super::resolve::resolve;
use crate::error::{Result, RuleGraphError};
use crate::event_log::{EventKind, EventLog};
use crate::rules::RuleRegistry;
use crate::source::SourceCheck;

/// What the memo knows about a path
#[derive(Debug, Clone)]
enum PathState {
    Produced(JobKey),
    Source { exists: bool },
}

/// Shared resolution memo
#[derive(Default)]
struct BuildState {
    jobs: DashMap<JobKey, Arc<Job>>,
    paths: DashMap<String, PathState>,
}

/// Builds job graphs from requested target paths
#[derive(Clone)]
pub struct DagBuilder {
    registry: Arc<RuleRegistry>,
    source_check: Arc<dyn SourceCheck>,
    strict_sources: bool,
    events: EventLog,
}

impl DagBuilder {
    pub fn new(registry: Arc<RuleRegistry>, source_check: Arc<dyn SourceCheck>) -> Self {
        Self {
            registry,
            source_check,
            strict_sources: false,
            events: EventLog::new(),
        }
    }

    /// Treat a missing source anywhere in the graph as a build error
    pub fn strict_sources(mut self, strict: bool) -> Self {
        self.strict_sources = strict;
        self
    }

    /// Record build events into `events`
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Build the graph for `targets`, one target after another
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub fn build<S: AsRef<str>>(&self, targets: &[S]) -> Result<Graph> {
        let targets = owned_targets(targets)?;
        let started = Instant::now();
        self.events.emit(EventKind::BuildStarted {
            targets: targets.clone(),
        });

        let state = BuildState::default();
        for target in &targets {
            if let Err(e) = self.resolve_target(target, &state) {
                return Err(self.fail(e));
            }
        }

        self.finish(targets, &state, started)
    }

    /// Build with each target's subtree resolved on the blocking pool.
    ///
    /// Subtrees share the memo, so a job reachable from several targets is
    /// still resolved once. When several targets fail, the error of the
    /// earliest target is reported. The result equals [`build`](Self::build).
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn build_concurrent<S: AsRef<str>>(&self, targets: &[S]) -> Result<Graph> {
        let targets = owned_targets(targets)?;
        let started = Instant::now();
        self.events.emit(EventKind::BuildStarted {
            targets: targets.clone(),
        });

        let state = Arc::new(BuildState::default());
        let mut set = JoinSet::new();
        for (index, target) in targets.iter().cloned().enumerate() {
            let builder = self.clone();
            let state = Arc::clone(&state);
            set.spawn_blocking(move || (index, builder.resolve_target(&target, &state)));
        }

        let mut failures: Vec<(usize, RuleGraphError)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(e))) => failures.push((index, e)),
                Err(e) => {
                    return Err(self.fail(RuleGraphError::Io(std::io::Error::other(format!(
                        "resolution task aborted: {}",
                        e
                    )))))
                }
            }
        }

        if let Some((_, e)) = failures.into_iter().min_by_key(|(index, _)| *index) {
            return Err(self.fail(e));
        }

        self.finish(targets, &state, started)
    }

    fn resolve_target(&self, target: &str, state: &BuildState) -> Result<()> {
        let mut chain = Vec::new();
        self.visit(target, &mut chain, true, state)
    }

    fn visit(
        &self,
        path: &str,
        chain: &mut Vec<(String, JobKey)>,
        requested: bool,
        state: &BuildState,
    ) -> Result<()> {
        if let Some(start) = chain.iter().position(|(p, _)| p == path) {
            return Err(cycle_error(&chain[start..], path));
        }
        if state.paths.contains_key(path) {
            return Ok(());
        }

        let Some((rule, binding)) = self.registry.find_producer(path)? else {
            let exists = self.source_check.exists(path);
            if !exists && (requested || self.strict_sources) {
                return Err(RuleGraphError::NoRule {
                    path: path.to_string(),
                });
            }
            if !exists {
                warn!(path, "source does not exist yet");
            }
            state
                .paths
                .insert(path.to_string(), PathState::Source { exists });
            return Ok(());
        };

        let key = JobKey {
            rule: rule.name_arc(),
            wildcards: binding.clone(),
        };
        if let Some(start) = chain.iter().position(|(_, k)| *k == key) {
            return Err(cycle_error(&chain[start..], path));
        }

        let existing = state.jobs.get(&key).map(|j| Arc::clone(j.value()));
        let job = match existing {
            Some(job) => job,
            None => {
                let resolved = Arc::new(resolve(&rule, &binding)?);
                let (job, fresh) = match state.jobs.entry(key.clone()) {
                    Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                    Entry::Vacant(entry) => (Arc::clone(entry.insert(resolved).value()), true),
                };
                // a racing branch may have stored the job first
                if fresh {
                    self.events.emit(EventKind::JobResolved {
                        rule: Arc::clone(&job.rule),
                        wildcards: job.wildcards.to_string(),
                        outputs: job.output_paths().map(String::from).collect(),
                    });
                }
                job
            }
        };

        chain.push((path.to_string(), key.clone()));
        let result = job
            .input_paths()
            .try_for_each(|input| self.visit(input, chain, false, state));
        chain.pop();
        result?;

        for output in job.output_paths() {
            state
                .paths
                .insert(output.to_string(), PathState::Produced(key.clone()));
        }
        Ok(())
    }

    fn finish(&self, targets: Vec<String>, state: &BuildState, started: Instant) -> Result<Graph> {
        let graph = match assemble(targets, state) {
            Ok(graph) => graph,
            Err(e) => return Err(self.fail(e)),
        };

        for source in graph.sources() {
            self.events.emit(EventKind::SourceRegistered {
                path: source.path.clone(),
                exists: source.exists,
            });
        }
        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.emit(EventKind::BuildCompleted {
            jobs: graph.len(),
            sources: graph.sources().len(),
            duration_ms,
        });
        info!(
            jobs = graph.len(),
            sources = graph.sources().len(),
            duration_ms,
            "graph built"
        );
        Ok(graph)
    }

    fn fail(&self, error: RuleGraphError) -> RuleGraphError {
        self.events.emit(EventKind::BuildFailed {
            error: error.to_string(),
        });
        error
    }
}

fn owned_targets<S: AsRef<str>>(targets: &[S]) -> Result<Vec<String>> {
    if targets.is_empty() {
        return Err(RuleGraphError::NoTargets);
    }
    Ok(targets.iter().map(|t| t.as_ref().to_string()).collect())
}

fn cycle_error(frames: &[(String, JobKey)], closing: &str) -> RuleGraphError {
    let mut cycle: Vec<&str> = frames.iter().map(|(p, _)| p.as_str()).collect();
    cycle.push(closing);
    RuleGraphError::CyclicDependency {
        cycle: cycle.join(" → "),
    }
}

/// Phase 2: deterministic, dependencies-first job order
fn assemble(targets: Vec<String>, state: &BuildState) -> Result<Graph> {
    struct Walk<'a> {
        state: &'a BuildState,
        visited: HashSet<String>,
        emitted: HashSet<JobKey>,
        jobs: Vec<Arc<Job>>,
        sources: IndexMap<String, bool>,
    }

    impl Walk<'_> {
        fn path(&mut self, path: &str) {
            if !self.visited.insert(path.to_string()) {
                return;
            }
            let entry = self.state.paths.get(path).map(|e| e.value().clone());
            match entry {
                Some(PathState::Source { exists }) => {
                    self.sources.insert(path.to_string(), exists);
                }
                Some(PathState::Produced(key)) => {
                    if !self.emitted.insert(key.clone()) {
                        return;
                    }
                    let Some(job) = self.state.jobs.get(&key).map(|j| Arc::clone(j.value()))
                    else {
                        return;
                    };
                    for input in job.input_paths() {
                        self.path(input);
                    }
                    self.jobs.push(job);
                }
                None => debug!(path, "path missing from build memo"),
            }
        }
    }

    let mut walk = Walk {
        state,
        visited: HashSet::new(),
        emitted: HashSet::new(),
        jobs: Vec::new(),
        sources: IndexMap::new(),
    };
    for target in &targets {
        walk.path(target);
    }

    let sources = walk
        .sources
        .into_iter()
        .map(|(path, exists)| SourceNode { path, exists })
        .collect();
    Graph::from_parts(targets, walk.jobs, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::WildcardBinding;
    use crate::rules::{FunctionRef, RulePattern};

    fn registry(rules: Vec<RulePattern>) -> Arc<RuleRegistry> {
        let mut registry = RuleRegistry::new();
        for rule in rules {
            registry.register(rule).unwrap();
        }
        Arc::new(registry)
    }

    fn on_disk(existing: &'static [&'static str]) -> Arc<dyn SourceCheck> {
        Arc::new(move |path: &str| existing.iter().any(|e| *e == path))
    }

    #[test]
    fn test_chain_of_rules() {
        let builder = DagBuilder::new(
            registry(vec![
                RulePattern::builder("trim")
                    .output("trimmed/{s}.fq")
                    .input("raw/{s}.fq")
                    .build()
                    .unwrap(),
                RulePattern::builder("count")
                    .output("counts/{s}.txt")
                    .input("trimmed/{s}.fq")
                    .build()
                    .unwrap(),
            ]),
            on_disk(&["raw/a.fq"]),
        );

        let graph = builder.build(&["counts/a.txt"]).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.jobs()[0].rule.as_ref(), "trim");
        assert_eq!(graph.dependencies(1), &[0]);
        assert_eq!(graph.sources().len(), 1);
        assert!(graph.sources()[0].exists);
    }

    #[test]
    fn test_requested_target_without_rule() {
        let builder = DagBuilder::new(registry(vec![]), on_disk(&[]));
        let err = builder.build(&["out/s1.txt"]).unwrap_err();
        assert!(matches!(err, RuleGraphError::NoRule { ref path } if path == "out/s1.txt"));
    }

    #[test]
    fn test_existing_target_is_a_source() {
        let builder = DagBuilder::new(registry(vec![]), on_disk(&["data.csv"]));
        let graph = builder.build(&["data.csv"]).unwrap();
        assert!(graph.is_empty());
        assert_eq!(graph.sources().len(), 1);
    }

    #[test]
    fn test_missing_transitive_source_is_deferred() {
        let rules = || {
            registry(vec![RulePattern::builder("copy")
                .output("out/{s}.txt")
                .input("in/{s}.txt")
                .build()
                .unwrap()])
        };

        let graph = DagBuilder::new(rules(), on_disk(&[]))
            .build(&["out/x.txt"])
            .unwrap();
        assert_eq!(graph.missing_sources().count(), 1);

        let err = DagBuilder::new(rules(), on_disk(&[]))
            .strict_sources(true)
            .build(&["out/x.txt"])
            .unwrap_err();
        assert_eq!(err.code(), "RG-021");
    }

    #[test]
    fn test_self_cycle() {
        let builder = DagBuilder::new(
            registry(vec![RulePattern::builder("loop")
                .output("a/{x}.txt")
                .input("a/{x}.txt")
                .build()
                .unwrap()]),
            on_disk(&[]),
        );
        let err = builder.build(&["a/1.txt"]).unwrap_err();
        match err {
            RuleGraphError::CyclicDependency { cycle } => assert_eq!(cycle, "a/1.txt → a/1.txt"),
            other => panic!("Expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_two_rule_cycle() {
        let builder = DagBuilder::new(
            registry(vec![
                RulePattern::builder("ab")
                    .output("{x}.a")
                    .input("{x}.b")
                    .build()
                    .unwrap(),
                RulePattern::builder("ba")
                    .output("{x}.b")
                    .input("{x}.a")
                    .build()
                    .unwrap(),
            ]),
            on_disk(&[]),
        );
        let err = builder.build(&["f.a"]).unwrap_err();
        assert!(err.to_string().contains("f.a → f.b → f.a"));
    }

    #[test]
    fn test_shared_dependency_resolved_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let counted = FunctionRef::new("counted", |_: &WildcardBinding| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok("ref.fa".into())
        });
        let builder = DagBuilder::new(
            registry(vec![
                RulePattern::builder("index")
                    .output("ref.idx")
                    .input_fn("fa", counted)
                    .build()
                    .unwrap(),
                RulePattern::builder("map")
                    .output("mapped/{s}.bam")
                    .named_input("idx", "ref.idx")
                    .build()
                    .unwrap(),
            ]),
            on_disk(&["ref.fa"]),
        );

        let graph = builder.build(&["mapped/a.bam", "mapped/b.bam"]).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_targets() {
        let builder = DagBuilder::new(registry(vec![]), on_disk(&[]));
        let targets: [&str; 0] = [];
        assert!(matches!(builder.build(&targets), Err(RuleGraphError::NoTargets)));
    }

    #[test]
    fn test_build_events_recorded() {
        let events = EventLog::new();
        let builder = DagBuilder::new(
            registry(vec![RulePattern::builder("copy")
                .output("out/{s}.txt")
                .input("in/{s}.txt")
                .build()
                .unwrap()]),
            on_disk(&["in/a.txt"]),
        )
        .with_events(events.clone());

        builder.build(&["out/a.txt"]).unwrap();
        let kinds: Vec<&str> = events
            .events()
            .iter()
            .map(|e| e.kind.name())
            .collect();
        assert_eq!(
            kinds,
            vec!["build_started", "job_resolved", "source_registered", "build_completed"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let rules = registry(vec![
            RulePattern::builder("trim")
                .output("trimmed/{s}.fq")
                .input("raw/{s}.fq")
                .build()
                .unwrap(),
            RulePattern::builder("count")
                .output("counts/{s}.txt")
                .input("trimmed/{s}.fq")
                .named_input("ref", "ref.fa")
                .build()
                .unwrap(),
        ]);
        let targets = ["counts/a.txt", "counts/b.txt", "counts/c.txt"];
        let builder = DagBuilder::new(rules, on_disk(&["raw/a.fq", "raw/b.fq", "raw/c.fq", "ref.fa"]));

        let sequential = builder.build(&targets).unwrap();
        let concurrent = builder.build_concurrent(&targets).await.unwrap();

        assert_eq!(sequential.jobs(), concurrent.jobs());
        assert_eq!(sequential.sources(), concurrent.sources());
        assert_eq!(
            sequential.edges().collect::<Vec<_>>(),
            concurrent.edges().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_concurrent_resolution_events_once_per_job() {
        let events = EventLog::new();
        let builder = DagBuilder::new(
            registry(vec![
                RulePattern::builder("index")
                    .output("ref.idx")
                    .input("ref.fa")
                    .build()
                    .unwrap(),
                RulePattern::builder("map")
                    .output("mapped/{s}.bam")
                    .named_input("idx", "ref.idx")
                    .build()
                    .unwrap(),
            ]),
            on_disk(&["ref.fa"]),
        )
        .with_events(events.clone());

        let targets: Vec<String> = (0..32).map(|i| format!("mapped/s{}.bam", i)).collect();
        let graph = builder.build_concurrent(&targets).await.unwrap();

        let resolved = events
            .events()
            .iter()
            .filter(|e| e.kind.name() == "job_resolved")
            .count();
        assert_eq!(graph.len(), 33);
        assert_eq!(resolved, graph.len());
    }

    #[tokio::test]
    async fn test_concurrent_reports_first_target_error() {
        let builder = DagBuilder::new(registry(vec![]), on_disk(&[]));
        let err = builder
            .build_concurrent(&["missing/one", "missing/two"])
            .await
            .unwrap_err();
        assert!(matches!(err, RuleGraphError::NoRule { ref path } if path == "missing/one"));
    }
}
