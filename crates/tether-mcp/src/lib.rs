//! MCP (Model Context Protocol) client plumbing for Tether.
//!
//! Owns a single stdio-based MCP server: the child process is spawned
//! lazily, initialized with a handshake, and spoken to over newline-delimited
//! JSON-RPC 2.0. Responses are matched to requests by id; diagnostics on the
//! server's stderr are scrubbed of credentials before they reach the logs.

pub mod client;
pub mod config;
mod correlator;
pub mod error;
pub mod jsonrpc;
pub mod redact;
mod transport;

pub use client::{McpClient, ToolContent, ToolInfo, ToolOutcome};
pub use config::McpServerConfig;
pub use error::McpError;
pub use redact::REDACTED;
pub use transport::StdioTransport;
