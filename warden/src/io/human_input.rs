//! Cancellable human text input.
//!
//! A blocking reader thread owns stdin and feeds lines into a channel. Each
//! request races the next line against the session cancellation token. Lines
//! queued ahead of a prompt are answers typed or piped early and are kept,
//! unless the previous request was cancelled: then they belong to that
//! abandoned prompt and are dropped.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SessionError;

#[async_trait]
pub trait InputSource: Send + Sync {
    /// Show `prompt` and wait for one line of input.
    ///
    /// Returns `SessionError::InputCancelled` (inside `anyhow`) when `cancel`
    /// fires first.
    async fn read_line(&self, prompt: &str, cancel: &CancellationToken) -> Result<String>;
}

/// Line input from the process's stdin.
pub struct StdinInput {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Set when a request was cancelled before it got its line.
    interrupted: AtomicBool,
}

impl StdinInput {
    /// Spawn the reader thread. The thread ends with stdin (EOF or error).
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("warden-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(err = %err, "stdin read failed");
                            break;
                        }
                    }
                }
                debug!("stdin reader finished");
            })
            .context("spawn stdin reader")?;
        Ok(Self::from_receiver(rx))
    }

    fn from_receiver(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
            interrupted: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl InputSource for StdinInput {
    async fn read_line(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        let mut lines = self.lines.lock().await;
        if self.interrupted.swap(false, Ordering::SeqCst) {
            let mut stale = 0usize;
            while lines.try_recv().is_ok() {
                stale += 1;
            }
            if stale > 0 {
                debug!(stale, "discarded input typed for a cancelled prompt");
            }
        }

        {
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{prompt}").context("write prompt")?;
            stdout.flush().context("flush prompt")?;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.interrupted.store(true, Ordering::SeqCst);
                Err(SessionError::InputCancelled.into())
            }
            line = lines.recv() => line.context("stdin closed"),
        }
    }
}
