//! Code execution for the Executor participant.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::core::text::CodeBlock;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

#[async_trait]
pub trait CodeSandbox: Send + Sync {
    /// Run one code block and return a report of its outcome.
    async fn run(&self, block: &CodeBlock) -> Result<String>;
}

/// Runs code blocks as local child processes with the confinement root as
/// working directory.
///
/// This is not isolation. The interpreter runs on the host as the current
/// user with full filesystem and network access; the working directory and
/// the timeout are the only limits. Sessions refuse to build an Executor on
/// top of it unless a human approves code first or the config opts in with
/// `sandbox.allow_unsupervised`.
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl LocalSandbox {
    pub fn new(workdir: impl Into<PathBuf>, config: &SandboxConfig) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

}

fn interpreter(language: &str) -> Result<&'static str> {
    match language {
        "" | "python" | "py" | "python3" => Ok("python3"),
        "sh" | "bash" | "shell" | "console" => Ok("sh"),
        other => bail!("unsupported code block language '{other}'"),
    }
}

#[async_trait]
impl CodeSandbox for LocalSandbox {
    #[instrument(skip_all, fields(language = %block.language, workdir = %self.workdir.display()))]
    async fn run(&self, block: &CodeBlock) -> Result<String> {
        let program = interpreter(&block.language)?;
        let mut cmd = Command::new(program);
        cmd.current_dir(&self.workdir);
        if program == "sh" {
            cmd.arg("-s");
        } else {
            cmd.arg("-");
        }

        let code = block.code.clone().into_bytes();
        let timeout = self.timeout;
        let limit = self.output_limit_bytes;
        info!(program, "running code block");
        let output = tokio::task::spawn_blocking(move || {
            run_command_with_timeout(cmd, Some(&code), timeout, limit)
        })
        .await
        .context("join sandbox task")?
        .with_context(|| format!("run {program}"))?;
        Ok(output.render())
    }
}
