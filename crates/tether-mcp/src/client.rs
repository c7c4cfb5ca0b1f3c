//! MCP client — owns one server connection, opened on demand.
//!
//! The channel is a lazily-acquired resource: the first call spawns the
//! process, runs the `initialize` handshake plus `notifications/initialized`,
//! and discovers tools with `tools/list`. If the process has since died, the
//! next call re-acquires from scratch; there is no automatic respawn.

use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::transport::StdioTransport;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// MCP protocol version we speak.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// A tool advertised by the server.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Typed view of a `tools/call` result, for callers that want the content
/// items rather than the raw value.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolOutcome {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

/// A content item in a tool result.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ToolOutcome {
    /// Parse the raw `tools/call` result value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, McpError> {
        serde_json::from_value(value.clone())
            .map_err(|e| McpError::Protocol(format!("malformed tools/call result: {e}")))
    }
}

#[derive(Deserialize)]
struct ToolsListResult {
    tools: Vec<ToolEntry>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// An open, handshaken channel with its discovered tools.
struct Channel {
    transport: StdioTransport,
    tools: Vec<ToolInfo>,
}

/// Client for a single stdio MCP server.
pub struct McpClient {
    config: McpServerConfig,
    channel: Mutex<Option<Arc<Channel>>>,
}

impl McpClient {
    /// Create a client. Nothing is spawned until the first call.
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            channel: Mutex::new(None),
        }
    }

    /// Make sure the channel is up: spawn + handshake + discovery if the
    /// process is not already running. Idempotent; concurrent callers race
    /// to exactly one spawn because the slot is held across the whole
    /// acquisition.
    pub async fn ensure_channel(&self) -> Result<(), McpError> {
        self.channel_handle().await.map(|_| ())
    }

    async fn channel_handle(&self) -> Result<Arc<Channel>, McpError> {
        let mut slot = self.channel.lock().await;
        if let Some(channel) = slot.as_ref() {
            if channel.transport.is_alive().await {
                return Ok(Arc::clone(channel));
            }
            tracing::warn!("MCP server process has exited; reopening channel");
            *slot = None;
        }

        let transport = StdioTransport::spawn(&self.config)?;
        let channel = Arc::new(Self::handshake(transport).await?);
        *slot = Some(Arc::clone(&channel));
        Ok(channel)
    }

    async fn handshake(transport: StdioTransport) -> Result<Channel, McpError> {
        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "tether",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });

        if let Err(e) = transport.send("initialize", Some(init_params)).await {
            transport.shutdown().await;
            return Err(McpError::Handshake(e.to_string()));
        }

        transport
            .send_notification("notifications/initialized", None)
            .await?;

        let tools_value = match transport.send("tools/list", None).await {
            Ok(v) => v,
            Err(e) => {
                transport.shutdown().await;
                return Err(e);
            }
        };
        let list: ToolsListResult = serde_json::from_value(tools_value)
            .map_err(|e| McpError::Protocol(format!("malformed tools/list response: {e}")))?;
        let tools: Vec<ToolInfo> = list
            .tools
            .into_iter()
            .map(|t| ToolInfo {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
            })
            .collect();

        tracing::info!("MCP server connected with {} tools", tools.len());

        Ok(Channel { transport, tools })
    }

    /// Invoke a tool, returning the raw `result` value. Request timeouts and
    /// protocol errors fail this call only; the channel stays usable.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let channel = self.channel_handle().await?;
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        channel.transport.send("tools/call", Some(params)).await
    }

    /// Tools discovered at handshake time. Opens the channel if needed.
    pub async fn tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        Ok(self.channel_handle().await?.tools.clone())
    }

    /// Close the channel if it is open; the process gets a bounded window
    /// to exit before it is killed.
    pub async fn shutdown(&self) {
        let taken = self.channel.lock().await.take();
        if let Some(channel) = taken {
            if let Ok(channel) = Arc::try_unwrap(channel) {
                channel.transport.shutdown().await;
            }
        }
    }
}
