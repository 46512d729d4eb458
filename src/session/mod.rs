//! Server session: process lifecycle plus the MCP handshake.
//!
//! One `Session` owns one child process for its lifetime. Connecting spawns
//! the process, waits for the ready pattern when one is configured, then
//! performs the `initialize` / `notifications/initialized` handshake. All
//! waiting during startup is bounded by a single wall-clock deadline taken
//! at spawn time.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::transport::{MessageHandler, ProcessManager};
use crate::types::{JsonRpcRequest, ServerHandshake, Tool, JSONRPC_VERSION, MCP_PROTOCOL_VERSION};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Default deadline for a single response read.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

pub struct Session {
    config: ServerConfig,
    process: Arc<ProcessManager>,
    handler: MessageHandler,
    next_id: AtomicI64,
    connected: AtomicBool,
    read_timeout: Duration,
    handshake: Mutex<Option<ServerHandshake>>,
}

impl Session {
    pub fn new(config: ServerConfig) -> Self {
        let process = Arc::new(ProcessManager::new(config.clone()));
        let handler = MessageHandler::new(process.clone(), config.ready_pattern.as_deref());
        Self {
            config,
            process,
            handler,
            next_id: AtomicI64::new(1),
            connected: AtomicBool::new(false),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            handshake: Mutex::new(None),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Spawn the server and complete the MCP handshake.
    pub async fn connect(&self) -> Result<()> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.startup_timeout_ms);

        let (tx, rx) = mpsc::unbounded_channel();
        self.handler.spawn_dispatch(rx);
        self.process.start(tx).await?;

        if self.config.ready_pattern.is_some() {
            self.handler
                .wait_for_ready(Self::remaining_ms(deadline))
                .await
                .map_err(|_| Error::StartupTimeout(self.config.startup_timeout_ms))?;
        }

        self.initialize(deadline).await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn remaining_ms(deadline: tokio::time::Instant) -> u64 {
        deadline
            .saturating_duration_since(tokio::time::Instant::now())
            .as_millis() as u64
    }

    async fn initialize(&self, deadline: tokio::time::Instant) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let init_request = JsonRpcRequest::new(
            id,
            "initialize",
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "mcp-aegis",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );

        self.handler
            .send_message(&serde_json::to_value(&init_request)?)
            .await?;
        debug!("Sent initialize request");

        let remaining = Duration::from_millis(Self::remaining_ms(deadline).max(1));
        let response = match self.handler.read_message(remaining).await {
            Ok(value) => value,
            Err(Error::ReadTimeout) => {
                return Err(Error::StartupTimeout(self.config.startup_timeout_ms))
            }
            Err(e) => return Err(e),
        };

        if response.get("jsonrpc") != Some(&json!(JSONRPC_VERSION)) {
            return Err(Error::Protocol("Invalid JSON-RPC version".to_string()));
        }
        if response.get("id") != Some(&json!(id)) {
            return Err(Error::Protocol(format!(
                "Initialize response id mismatch: expected {}, got {:?}",
                id,
                response.get("id")
            )));
        }
        let result = response
            .get("result")
            .ok_or_else(|| Error::Protocol("Initialize response missing result".to_string()))?;

        let handshake: ServerHandshake = serde_json::from_value(result.clone())
            .map_err(|e| Error::Protocol(format!("Malformed initialize result: {}", e)))?;

        if handshake.protocol_version != MCP_PROTOCOL_VERSION {
            warn!(
                "Server '{}' uses protocol version {} (tester speaks {})",
                self.config.name, handshake.protocol_version, MCP_PROTOCOL_VERSION
            );
        }
        if let Some(name) = handshake.server_info.get("name").and_then(|n| n.as_str()) {
            info!(
                "Server '{}' initialized: {} v{}",
                self.config.name,
                name,
                handshake
                    .server_info
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
            );
        }
        *self.handshake.lock().await = Some(handshake);

        let initialized = JsonRpcRequest::notification("notifications/initialized", None);
        self.handler
            .send_message(&serde_json::to_value(&initialized)?)
            .await?;
        debug!("Sent initialized notification");
        Ok(())
    }

    /// Send a request and return the full raw response object.
    ///
    /// Ids are generated per session; the response id must echo the request
    /// id. The raw object is what test expectations are matched against, so
    /// error responses come back as data rather than failing here.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        self.handler
            .send_message(&serde_json::to_value(&request)?)
            .await?;
        let response = self.handler.read_message(self.read_timeout).await?;
        if response.get("id") != Some(&json!(id)) {
            return Err(Error::Protocol(format!(
                "Response id mismatch: expected {}, got {:?}",
                id,
                response.get("id")
            )));
        }
        Ok(response)
    }

    /// Send a request with an explicit pre-built id, for suites that pin ids.
    pub async fn send_raw(&self, request: &Value) -> Result<Value> {
        self.handler.send_message(request).await?;
        let response = self.handler.read_message(self.read_timeout).await?;
        if let Some(request_id) = request.get("id") {
            if response.get("id") != Some(request_id) {
                return Err(Error::Protocol(format!(
                    "Response id mismatch: expected {}, got {:?}",
                    request_id,
                    response.get("id")
                )));
            }
        }
        Ok(response)
    }

    /// Send a request and unwrap its `result`, surfacing a server error
    /// object as an `Err`.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let response = self.send_request(method, params).await?;
        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            return Err(Error::Tool(format!("{} (code {})", message, code)));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result = self.request("tools/list", Some(json!({}))).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| Error::Protocol("tools/list result missing 'tools'".to_string()))?;
        serde_json::from_value(tools)
            .map_err(|e| Error::Protocol(format!("Malformed tools list: {}", e)))
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        self.request(
            "tools/call",
            Some(json!({"name": name, "arguments": args})),
        )
        .await
    }

    pub async fn handshake_info(&self) -> Option<ServerHandshake> {
        self.handshake.lock().await.clone()
    }

    pub async fn get_stderr(&self) -> String {
        self.handler.get_stderr().await
    }

    pub async fn clear_stderr(&self) {
        self.handler.clear_stderr().await
    }

    pub async fn pending_read_count(&self) -> usize {
        self.handler.pending_read_count().await
    }

    /// Cancel outstanding reads, close stdin, and stop the process.
    /// Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        self.handler.cancel_all_reads().await;
        self.process.close_stdin().await;
        self.process.stop().await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
