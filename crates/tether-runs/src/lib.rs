//! Run queue and live-status tracking for Tether.
//!
//! Tool calls are serialized through a strict FIFO queue drained one at a
//! time against the MCP channel. Each queued call is a [`Run`] with a
//! forward-only lifecycle (`queued → running → done | failed | cancelled`);
//! lifecycle changes are broadcast as [`RunEvent`]s and completed runs are
//! retained in a bounded history.

pub mod error;
pub mod event;
pub mod history;
pub mod run;
pub mod scheduler;

pub use error::RunError;
pub use event::{HistorySnapshot, RunEvent};
pub use run::{Run, RunState};
pub use scheduler::{RunHandle, RunMeta, Scheduler, SchedulerOptions, ToolCall, ToolChannel};
