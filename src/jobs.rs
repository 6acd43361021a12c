//! Built-in job kinds available to config-defined tasks.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

use taskhands_core::{Job, JobContext, JobError};

/// Job kinds selectable with `job = "<kind>"`.
pub(crate) const BUILTIN_KINDS: [&str; 3] = ["log", "noop", "shell"];

const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 60;

/// Look up a built-in job by kind.
pub(crate) fn builtin_job(kind: &str) -> Option<Arc<dyn Job>> {
    match kind {
        "log" => Some(Arc::new(LogJob)),
        "noop" => Some(Arc::new(NoopJob)),
        "shell" => Some(Arc::new(ShellJob)),
        _ => None,
    }
}

/// Writes `params.message` (or the description) to the log.
pub(crate) struct LogJob;

#[async_trait]
impl Job for LogJob {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        let message = ctx
            .param_str("message")
            .unwrap_or(ctx.description.as_str());
        info!(task = %ctx.key, trigger = %ctx.kind, "{}", message);
        Ok(())
    }
}

/// Does nothing.
pub(crate) struct NoopJob;

#[async_trait]
impl Job for NoopJob {
    async fn run(&self, _ctx: JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

/// Runs `params.command` through `sh -c`.
///
/// Optional params: `cwd`, `timeout_secs` (default 60). A non-zero exit
/// fails the firing with the captured stderr.
pub(crate) struct ShellJob;

#[async_trait]
impl Job for ShellJob {
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        let command = ctx
            .param_str("command")
            .ok_or_else(|| JobError::failed("shell job requires a 'command' parameter"))?;
        let limit = ctx
            .params
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_SHELL_TIMEOUT_SECS);

        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = ctx.param_str("cwd") {
            cmd.current_dir(PathBuf::from(cwd));
        }

        let output = timeout(Duration::from_secs(limit), cmd.output())
            .await
            .map_err(|_| JobError::failed(format!("command timed out after {}s", limit)))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!(task = %ctx.key, "{}", stdout.trim_end());
        }

        if output.status.success() {
            Ok(())
        } else {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(JobError::failed(format!(
                "command failed with exit code {}: {}",
                code,
                stderr.trim()
            )))
        }
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
