//! Graph execution
//!
//! Jobs run one at a time in topological order. A job is skipped when all
//! of its outputs exist, none is older than an input, and no dependency ran
//! in this pass.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use tracing::{debug, info, instrument, warn};

use super::runner::{ActionRunner, ShellRunner};
use crate::dag::{Graph, Job, JobId};
use crate::error::{Result, RuleGraphError};
use crate::event_log::{EventKind, EventLog};

/// Counts from one execution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

pub struct Executor {
    runner: Arc<dyn ActionRunner>,
    workdir: PathBuf,
    force: bool,
    events: EventLog,
}

impl Executor {
    /// Shell execution rooted at `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            runner: Arc::new(ShellRunner::new(&workdir)),
            workdir,
            force: false,
            events: EventLog::new(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ActionRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Run every job regardless of timestamps
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Jobs an [`execute`](Self::execute) call would run, in order
    pub async fn plan(&self, graph: &Graph) -> Result<Vec<JobId>> {
        let mut pending = HashSet::new();
        let mut order = Vec::new();
        for (id, job) in graph.topological_order() {
            self.check_sources(graph, job).await?;
            if self.needs_run(graph, id, job, &pending).await? {
                pending.insert(id);
                order.push(id);
            }
        }
        Ok(order)
    }

    /// Run the graph. Stops at the first failing job.
    #[instrument(skip_all, fields(jobs = graph.len(), runner = self.runner.name()))]
    pub async fn execute(&self, graph: &Graph) -> Result<ExecutionSummary> {
        let started = Instant::now();
        let mut summary = ExecutionSummary::default();
        let mut ran = HashSet::new();

        for (id, job) in graph.topological_order() {
            self.check_sources(graph, job).await?;

            if !self.needs_run(graph, id, job, &ran).await? {
                debug!(job = %job.label(), "up to date");
                self.events.emit(EventKind::JobSkipped {
                    rule: Arc::clone(&job.rule),
                    job_id: id,
                });
                summary.skipped += 1;
                continue;
            }

            self.run_job(id, job).await?;
            ran.insert(id);
            summary.executed += 1;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            executed = summary.executed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "execution finished"
        );
        Ok(summary)
    }

    /// Inputs no job produces must exist by now
    async fn check_sources(&self, graph: &Graph, job: &Job) -> Result<()> {
        for input in job.input_paths() {
            if graph.producer_of(input).is_some() {
                continue;
            }
            if modified(&self.path(input)).await?.is_none() {
                return Err(RuleGraphError::MissingSource {
                    path: input.to_string(),
                    rule: job.rule.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn needs_run(
        &self,
        graph: &Graph,
        id: JobId,
        job: &Job,
        rerun: &HashSet<JobId>,
    ) -> Result<bool> {
        if self.force || graph.dependencies(id).iter().any(|d| rerun.contains(d)) {
            return Ok(true);
        }

        let mut oldest_output: Option<SystemTime> = None;
        for output in job.output_paths() {
            match modified(&self.path(output)).await? {
                None => return Ok(true),
                Some(t) => oldest_output = Some(oldest_output.map_or(t, |o| o.min(t))),
            }
        }

        let Some(oldest_output) = oldest_output else {
            return Ok(true);
        };
        for input in job.input_paths() {
            if let Some(t) = modified(&self.path(input)).await? {
                if t > oldest_output {
                    debug!(job = %job.label(), input, "input newer than outputs");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn run_job(&self, id: JobId, job: &Job) -> Result<()> {
        for output in job.output_paths() {
            if let Some(parent) = self.path(output).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        self.events.emit(EventKind::JobStarted {
            rule: Arc::clone(&job.rule),
            job_id: id,
            command: job.command.clone(),
        });
        info!(job = %job.label(), "running");
        let started = Instant::now();

        if let Some(command) = &job.command {
            if let Err(e) = self.runner.run(job, command).await {
                return Err(self
                    .fail(
                        id,
                        job,
                        RuleGraphError::JobFailed {
                            rule: job.rule.to_string(),
                            wildcards: job.wildcards.to_string(),
                            reason: format!("{:#}", e),
                        },
                    )
                    .await);
            }
        }

        for output in job.output_paths() {
            if modified(&self.path(output)).await?.is_none() {
                return Err(self
                    .fail(
                        id,
                        job,
                        RuleGraphError::MissingOutput {
                            rule: job.rule.to_string(),
                            path: output.to_string(),
                        },
                    )
                    .await);
            }
        }

        self.events.emit(EventKind::JobCompleted {
            rule: Arc::clone(&job.rule),
            job_id: id,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(())
    }

    /// Remove whatever the failed job left behind and record the failure
    async fn fail(&self, id: JobId, job: &Job, error: RuleGraphError) -> RuleGraphError {
        for output in job.output_paths() {
            match tokio::fs::remove_file(self.path(output)).await {
                Ok(()) => warn!(path = output, "removed output of failed job"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = output, error = %e, "could not remove output"),
            }
        }
        self.events.emit(EventKind::JobFailed {
            rule: Arc::clone(&job.rule),
            job_id: id,
            error: error.to_string(),
        });
        error
    }

    fn path(&self, path: &str) -> PathBuf {
        self.workdir.join(path)
    }
}

async fn modified(path: &Path) -> Result<Option<SystemTime>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
