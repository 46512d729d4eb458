//! Request/response plumbing over the child's pipes.
//!
//! A dispatch task owns the [`StreamBuffer`] and a FIFO of pending reads.
//! Incoming messages resolve the head of the FIFO; messages that arrive
//! while no read is outstanding wait in a backlog and are handed to the next
//! read in arrival order. That structure removes the listener-installation
//! race entirely: there is no window in which a message can be observed with
//! nobody to receive it.

use crate::error::{Error, Result};
use crate::transport::process::{PipeOutput, ProcessManager};
use crate::transport::stream_buffer::{StreamBuffer, StreamEvent};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::debug;

struct PendingRead {
    id: u64,
    tx: oneshot::Sender<Result<Value>>,
}

struct HandlerState {
    buffer: StreamBuffer,
    /// Messages (or parse failures) that arrived with no read outstanding.
    backlog: VecDeque<Result<Value>>,
    pending: VecDeque<PendingRead>,
    next_read_id: u64,
    cancelled: bool,
    exited: bool,
}

impl HandlerState {
    /// Resolve the head of the FIFO, or park the event in the backlog.
    /// The head is removed before resolution so no other producer can
    /// double-fire it.
    fn deliver(&mut self, outcome: Result<Value>) {
        match self.pending.pop_front() {
            Some(read) => {
                // The receiver may have timed out between arrival and
                // delivery; losing that race is benign.
                let _ = read.tx.send(outcome);
            }
            None => self.backlog.push_back(outcome),
        }
    }

    fn reject_all_pending(&mut self, make_error: impl Fn() -> Error) {
        while let Some(read) = self.pending.pop_front() {
            let _ = read.tx.send(Err(make_error()));
        }
    }
}

/// FIFO reader/writer for one server session.
#[derive(Clone)]
pub struct MessageHandler {
    process: Arc<ProcessManager>,
    state: Arc<Mutex<HandlerState>>,
    ready_rx: watch::Receiver<bool>,
    ready_tx: Arc<watch::Sender<bool>>,
}

impl MessageHandler {
    pub fn new(process: Arc<ProcessManager>, ready_pattern: Option<&str>) -> Self {
        let buffer = StreamBuffer::new(ready_pattern);
        let (ready_tx, ready_rx) = watch::channel(buffer.ready_status());
        Self {
            process,
            state: Arc::new(Mutex::new(HandlerState {
                buffer,
                backlog: VecDeque::new(),
                pending: VecDeque::new(),
                next_read_id: 0,
                cancelled: false,
                exited: false,
            })),
            ready_rx,
            ready_tx: Arc::new(ready_tx),
        }
    }

    /// Start the dispatch task consuming the process output channel.
    pub fn spawn_dispatch(&self, mut rx: mpsc::UnboundedReceiver<PipeOutput>) {
        let state = self.state.clone();
        let ready_tx = self.ready_tx.clone();
        tokio::spawn(async move {
            while let Some(output) = rx.recv().await {
                let mut s = state.lock().await;
                match output {
                    PipeOutput::Stdout(bytes) => {
                        for event in s.buffer.process_stdout(&bytes) {
                            let outcome = match event {
                                StreamEvent::Message(value) => Ok(value),
                                StreamEvent::ParseError { error, snippet } => {
                                    Err(Error::MessageParse(format!("{} in: {}", error, snippet)))
                                }
                            };
                            s.deliver(outcome);
                        }
                    }
                    PipeOutput::Stderr(bytes) => {
                        if s.buffer.process_stderr(&bytes) {
                            let _ = ready_tx.send(true);
                        }
                    }
                    PipeOutput::Exit { code, signal } => {
                        debug!("Rejecting pending reads: process exited ({:?}/{:?})", code, signal);
                        s.exited = true;
                        s.reject_all_pending(|| Error::ProcessExited);
                    }
                }
            }
        });
    }

    /// Serialize a message, append the frame delimiter, and write it to the
    /// child's stdin.
    pub async fn send_message(&self, message: &Value) -> Result<()> {
        let mut wire = serde_json::to_string(message)?;
        wire.push('\n');
        debug!(
            "Sending message: {}",
            wire.chars().take(100).collect::<String>()
        );
        self.process.write_to_stdin(wire.as_bytes()).await
    }

    /// Wait for the next message from the server.
    ///
    /// Returns the message already waiting in the backlog if one arrived
    /// before this call; otherwise registers at the tail of the FIFO. Fails
    /// with `Read timeout`, `Read operation cancelled`, `Server process
    /// exited`, or `Failed to parse JSON message`.
    pub async fn read_message(&self, timeout: Duration) -> Result<Value> {
        let (id, mut rx) = {
            let mut s = self.state.lock().await;
            if s.cancelled {
                return Err(Error::ReadCancelled);
            }
            if let Some(ready) = s.backlog.pop_front() {
                return ready;
            }
            if s.exited {
                return Err(Error::ProcessExited);
            }
            let (tx, rx) = oneshot::channel();
            let id = s.next_read_id;
            s.next_read_id += 1;
            s.pending.push_back(PendingRead { id, tx });
            (id, rx)
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without resolving: the session tore down.
            Ok(Err(_)) => Err(Error::ReadCancelled),
            Err(_elapsed) => {
                let mut s = self.state.lock().await;
                s.pending.retain(|p| p.id != id);
                drop(s);
                // A message may have resolved this read between the timer
                // firing and the lock being taken; prefer it over the
                // timeout.
                match rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::ReadTimeout),
                }
            }
        }
    }

    /// Fail every pending read and all future reads with `cancelled`.
    pub async fn cancel_all_reads(&self) {
        let mut s = self.state.lock().await;
        s.cancelled = true;
        s.reject_all_pending(|| Error::ReadCancelled);
    }

    pub async fn pending_read_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn get_stderr(&self) -> String {
        self.state.lock().await.buffer.get_stderr().to_string()
    }

    pub async fn clear_stderr(&self) {
        self.state.lock().await.buffer.clear_stderr();
    }

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.buffer.ready_status()
    }

    /// Block until the ready pattern has matched on stderr, bounded by the
    /// caller's startup deadline. Immediate when no pattern is configured.
    pub async fn wait_for_ready(&self, timeout_ms: u64) -> Result<()> {
        if self.is_ready().await {
            return Ok(());
        }
        let mut ready_rx = self.ready_rx.clone();
        let wait = async {
            loop {
                if *ready_rx.borrow() {
                    return;
                }
                if ready_rx.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(Duration::from_millis(timeout_ms), wait)
            .await
            .map_err(|_| Error::StartupTimeout(timeout_ms))?;
        if self.is_ready().await {
            Ok(())
        } else {
            Err(Error::StartupTimeout(timeout_ms))
        }
    }
}
