//! Stdio transport for MCP server communication.
//!
//! Spawns the child process and manages async communication over its
//! stdin/stdout using newline-delimited JSON-RPC messages. stderr is treated
//! as human-readable diagnostics: line-buffered, scrubbed by [`redact`],
//! and forwarded to tracing.

use crate::config::McpServerConfig;
use crate::correlator::Correlator;
use crate::error::McpError;
use crate::jsonrpc::{Notification, Request};
use crate::redact::redact_line;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Async stdio transport for one MCP server process.
#[derive(Debug)]
pub struct StdioTransport {
    correlator: Arc<Correlator>,
    write_tx: mpsc::Sender<String>,
    child: Arc<Mutex<Child>>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
    stderr_handle: JoinHandle<()>,
    default_timeout_ms: u64,
}

/// Removes the pending entry when a send is abandoned (timeout, dropped
/// future). Harmless after a normal resolve: the entry is already gone.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.discard(self.id);
    }
}

impl StdioTransport {
    /// Spawn the server process and start background reader/writer tasks.
    pub fn spawn(config: &McpServerConfig) -> Result<Self, McpError> {
        // A command given as a path must point at a regular file; bare names
        // are left to PATH resolution at spawn time.
        let path = Path::new(&config.command);
        if path.components().count() > 1 {
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => {}
                _ => {
                    return Err(McpError::BadExecutable {
                        path: config.command.clone(),
                    });
                }
            }
        }

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let correlator = Arc::new(Correlator::new());

        // Writer task: drains the channel into child stdin, one line each.
        let (write_tx, mut write_rx) = mpsc::channel::<String>(64);
        let writer_handle = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = write_rx.recv().await {
                if stdin.write_all(msg.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Reader task: splits stdout on newlines and dispatches by id.
        // Anything that is not a well-formed response is logged and dropped;
        // a bad line must never take the correlator down.
        let correlator_for_reader = Arc::clone(&correlator);
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let resp: crate::jsonrpc::Response = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("unparseable line on server stdout: {e}: {line}");
                        continue;
                    }
                };
                match resp.id {
                    Some(id) => {
                        if !correlator_for_reader.resolve(id, resp) {
                            tracing::warn!("dropping unsolicited response for id {id}");
                        }
                    }
                    None => tracing::debug!("server notification: {line}"),
                }
            }
        });

        // Stderr task: redact, then surface. Raw lines go nowhere else.
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(target: "tether_mcp::server", "{}", redact_line(&line));
            }
        });

        Ok(Self {
            correlator,
            write_tx,
            child: Arc::new(Mutex::new(child)),
            reader_handle,
            writer_handle,
            stderr_handle,
            default_timeout_ms: config.timeout_ms,
        })
    }

    /// Send a request and wait for its response, using the configured
    /// default timeout.
    pub async fn send(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        self.send_with_timeout(method, params, self.default_timeout_ms)
            .await
    }

    /// Send a request and wait up to `timeout_ms` for the matched response.
    /// Resolves to the response's `result`, or fails with the response's
    /// error object. A timeout only forgets this one request; other pending
    /// requests and the channel itself are unaffected.
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout_ms: u64,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.correlator.next_id();
        let rx = self.correlator.register(id);
        let _guard = PendingGuard {
            correlator: self.correlator.as_ref(),
            id,
        };

        let request = Request::new(id, method, params);
        let line = serde_json::to_string(&request)?;
        tracing::debug!("-> {line}");

        self.write_tx
            .send(line)
            .await
            .map_err(|_| McpError::Protocol("writer task stopped".to_string()))?;

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(resp)) => {
                if let Some(err) = resp.error {
                    return Err(McpError::JsonRpc {
                        code: err.code,
                        message: err.message,
                    });
                }
                Ok(resp.result.unwrap_or(serde_json::Value::Null))
            }
            Ok(Err(_)) => Err(McpError::Protocol(
                "response channel closed before a reply arrived".to_string(),
            )),
            Err(_) => Err(McpError::Timeout {
                method: method.to_string(),
                timeout_ms,
            }),
        }
    }

    /// Send a notification (fire-and-forget, no id, no response).
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let line = serde_json::to_string(&Notification::new(method, params))?;
        self.write_tx
            .send(line)
            .await
            .map_err(|_| McpError::Protocol("writer task stopped".to_string()))
    }

    /// Whether the child process is still running and writable.
    pub async fn is_alive(&self) -> bool {
        if self.write_tx.is_closed() {
            return false;
        }
        self.child
            .lock()
            .await
            .try_wait()
            .map(|status| status.is_none())
            .unwrap_or(false)
    }

    /// Shut down: close stdin, give the child a bounded window to exit,
    /// then kill it and stop the background tasks.
    pub async fn shutdown(self) {
        drop(self.write_tx);

        let child = self.child;
        let graceful = tokio::time::timeout(Duration::from_secs(5), async {
            let mut child = child.lock().await;
            let _ = child.wait().await;
        })
        .await;

        if graceful.is_err() {
            let mut child = child.lock().await;
            let _ = child.kill().await;
        }

        self.reader_handle.abort();
        self.writer_handle.abort();
        self.stderr_handle.abort();
    }
}
