//! Error types for scheduled runs.

use thiserror::Error;

/// How a run's future can fail. `Cancelled` is deliberately distinct from
/// channel failures so callers can tell user-initiated cancellation from a
/// genuine error.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Channel(#[from] tether_mcp::McpError),

    #[error("scheduler dropped before the run settled")]
    Detached,
}

impl RunError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled)
    }
}
