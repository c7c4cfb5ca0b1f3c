//! Error types for MCP client operations.

use thiserror::Error;

/// Errors from talking to the MCP server process.
///
/// Startup failures (`BadExecutable`, `Spawn`, `Handshake`) are fatal for
/// that channel instance; a later call may re-open the channel. `Timeout`
/// and `JsonRpc` are local to a single request.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("server executable '{path}' is missing or not a regular file")]
    BadExecutable { path: String },

    #[error("failed to spawn MCP server '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("initialize handshake failed: {0}")]
    Handshake(String),

    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("JSON-RPC error (code {code}): {message}")]
    JsonRpc { code: i64, message: String },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// True for errors that kill the channel instance rather than one request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            McpError::BadExecutable { .. } | McpError::Spawn { .. } | McpError::Handshake(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_includes_bound() {
        let err = McpError::Timeout {
            method: "tools/call".into(),
            timeout_ms: 30000,
        };
        assert_eq!(
            err.to_string(),
            "request 'tools/call' timed out after 30000ms"
        );
    }

    #[test]
    fn startup_errors_are_fatal() {
        assert!(
            McpError::BadExecutable {
                path: "/no/such".into()
            }
            .is_fatal()
        );
        assert!(McpError::Handshake("no reply".into()).is_fatal());
        assert!(
            !McpError::Timeout {
                method: "x".into(),
                timeout_ms: 1
            }
            .is_fatal()
        );
    }
}
