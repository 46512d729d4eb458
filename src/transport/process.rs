//! Child-process lifecycle for the server under test.
//!
//! Spawns the configured command with piped stdio, forwards raw stdout and
//! stderr bytes to the session's I/O channel, and owns shutdown: stdin is
//! closed first to let well-behaved servers exit on their own, then the
//! process is killed after a short grace period.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Bytes and lifecycle events flowing out of the child, in arrival order.
#[derive(Debug)]
pub enum PipeOutput {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

const READ_CHUNK: usize = 8192;
const GRACEFUL_WAIT_MS: u64 = 1500;
const EXIT_POLL_MS: u64 = 50;

/// Spawns and terminates the child; owns its stdin pipe.
pub struct ProcessManager {
    config: ServerConfig,
    child: Arc<Mutex<Option<Child>>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
}

impl ProcessManager {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            child: Arc::new(Mutex::new(None)),
            stdin: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the child and start the pipe-reader and exit-monitor tasks.
    /// All output is delivered through `output_tx`. Fails if already running.
    pub async fn start(&self, output_tx: mpsc::UnboundedSender<PipeOutput>) -> Result<()> {
        let mut child_slot = self.child.lock().await;
        if child_slot.is_some() {
            return Err(Error::Spawn("process already running".to_string()));
        }

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| Error::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("no stdin available".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("no stdout available".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn("no stderr available".to_string()))?;

        *self.stdin.lock().await = Some(stdin);
        *child_slot = Some(child);
        drop(child_slot);

        info!(
            "Spawned server process '{}' ({})",
            self.config.name, self.config.command
        );

        // Reader task per pipe. The channel preserves per-pipe arrival
        // order, which is all the framing layer needs.
        tokio::spawn(Self::pump_pipe(stdout, output_tx.clone(), PipeOutput::Stdout));
        tokio::spawn(Self::pump_pipe(stderr, output_tx.clone(), PipeOutput::Stderr));
        tokio::spawn(Self::monitor_exit(self.child.clone(), output_tx));

        Ok(())
    }

    async fn pump_pipe<R>(
        mut pipe: R,
        tx: mpsc::UnboundedSender<PipeOutput>,
        wrap: fn(Vec<u8>) -> PipeOutput,
    ) where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(wrap(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Pipe read error: {}", e);
                    break;
                }
            }
        }
    }

    /// Poll for process exit and surface it exactly once.
    ///
    /// `wait()` needs `&mut Child` and would pin the mutex across an await,
    /// so exit is observed with `try_wait` on an interval instead.
    async fn monitor_exit(
        child: Arc<Mutex<Option<Child>>>,
        tx: mpsc::UnboundedSender<PipeOutput>,
    ) {
        loop {
            tokio::time::sleep(Duration::from_millis(EXIT_POLL_MS)).await;
            let mut slot = child.lock().await;
            match slot.as_mut() {
                None => break,
                Some(c) => match c.try_wait() {
                    Ok(Some(status)) => {
                        let code = status.code();
                        #[cfg(unix)]
                        let signal = {
                            use std::os::unix::process::ExitStatusExt;
                            status.signal()
                        };
                        #[cfg(not(unix))]
                        let signal = None;
                        debug!("Server process exited: code={:?} signal={:?}", code, signal);
                        *slot = None;
                        let _ = tx.send(PipeOutput::Exit { code, signal });
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Failed to poll process status: {}", e);
                        break;
                    }
                },
            }
        }
    }

    /// Write raw bytes to the child's stdin and flush.
    pub async fn write_to_stdin(&self, bytes: &[u8]) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let stdin = stdin.as_mut().ok_or(Error::ProcessNotAvailable)?;
        stdin.write_all(bytes).await.map_err(|_| Error::ProcessNotAvailable)?;
        stdin.flush().await.map_err(|_| Error::ProcessNotAvailable)?;
        Ok(())
    }

    /// Close stdin without stopping the process.
    pub async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }

    pub async fn is_running(&self) -> bool {
        let mut slot = self.child.lock().await;
        match slot.as_mut() {
            None => false,
            Some(c) => matches!(c.try_wait(), Ok(None)),
        }
    }

    /// Graceful-then-forceful termination. Stopping a stopped process is a
    /// no-op.
    pub async fn stop(&self) -> Result<()> {
        self.close_stdin().await;

        {
            let mut slot = self.child.lock().await;
            let Some(child) = slot.as_mut() else {
                return Ok(());
            };
            if let Ok(Some(_)) = child.try_wait() {
                *slot = None;
                return Ok(());
            }
        }

        // Grace period: a server that exits when its stdin closes gets to
        // terminate on its own.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(GRACEFUL_WAIT_MS);
        loop {
            {
                let mut slot = self.child.lock().await;
                match slot.as_mut() {
                    None => return Ok(()),
                    Some(child) => {
                        if let Ok(Some(status)) = child.try_wait() {
                            debug!("Server exited gracefully: {:?}", status);
                            *slot = None;
                            return Ok(());
                        }
                        if tokio::time::Instant::now() >= deadline {
                            warn!("Server did not exit after stdin close; killing");
                            let _ = child.start_kill();
                            let _ = child.wait().await;
                            *slot = None;
                            return Ok(());
                        }
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(EXIT_POLL_MS)).await;
        }
    }
}
