//! Action runners: how a job's command is executed
//!
//! [`ShellRunner`] runs `sh -c` in the working directory. Embedders can plug
//! in their own runner (containers, remote hosts, test doubles).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::dag::Job;

#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Run the rendered command of `job`
    async fn run(&self, job: &Job, command: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// Runs commands through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    workdir: PathBuf,
}

impl ShellRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl ActionRunner for ShellRunner {
    async fn run(&self, job: &Job, command: &str) -> Result<()> {
        debug!(job = %job.label(), command, "spawning shell");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .output()
            .await
            .context("failed to spawn sh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            match output.status.code() {
                Some(code) if stderr.is_empty() => bail!("command exited with status {}", code),
                Some(code) => bail!("command exited with status {}: {}", code, stderr),
                None => bail!("command terminated by signal"),
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "shell"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::sample_job;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_shell_runner_runs_in_workdir() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::new(dir.path());
        runner
            .run(&sample_job(), "echo hi > marker.txt")
            .await
            .unwrap();
        assert!(dir.path().join("marker.txt").exists());
    }

    #[tokio::test]
    async fn test_shell_runner_reports_failure() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::new(dir.path());
        let err = runner
            .run(&sample_job(), "echo broken >&2; exit 3")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("status 3"));
        assert!(msg.contains("broken"));
    }
}
