//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exit code and both streams as one report for the transcript.
    pub fn render(&self) -> String {
        let mut out = match self.status.code() {
            Some(code) if !self.timed_out => format!("exitcode: {code}\n"),
            _ if self.timed_out => "exitcode: timeout\n".to_string(),
            _ => "exitcode: signal\n".to_string(),
        };
        let stdout = String::from_utf8_lossy(&self.stdout);
        let stderr = String::from_utf8_lossy(&self.stderr);
        if !stdout.trim().is_empty() {
            out.push_str("stdout:\n");
            out.push_str(stdout.trim_end());
            out.push('\n');
        }
        if self.stdout_truncated > 0 {
            out.push_str(&format!("[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        if !stderr.trim().is_empty() {
            out.push_str("stderr:\n");
            out.push_str(stderr.trim_end());
            out.push('\n');
        }
        if self.stderr_truncated > 0 {
            out.push_str(&format!("[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        out
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_exit_code_and_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo hello; exit 3");
        let output =
            run_command_with_timeout(cmd, None, Duration::from_secs(10), 1024).expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert!(!output.timed_out);
        let report = output.render();
        assert!(report.starts_with("exitcode: 3\n"));
        assert!(report.contains("stdout:\nhello\n"));
    }

    #[test]
    fn stdin_is_piped_to_child() {
        let output = run_command_with_timeout(
            Command::new("cat"),
            Some(b"from stdin"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(output.stdout, b"from stdin");
    }

    #[test]
    fn output_beyond_limit_is_counted_as_truncated() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 0123456789");
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(10), 4).expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.render().contains("[stdout truncated 6 bytes]"));
    }

    #[test]
    fn slow_command_times_out() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 5");
        let output =
            run_command_with_timeout(cmd, None, Duration::from_millis(100), 1024).expect("run");
        assert!(output.timed_out);
        assert!(output.render().starts_with("exitcode: timeout"));
    }
}
