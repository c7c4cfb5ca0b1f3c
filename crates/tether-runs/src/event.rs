//! Lifecycle events broadcast by the scheduler.

use crate::run::Run;
use serde::Serialize;

/// Point-in-time view of the queue (active run first, then pending in FIFO
/// order) and the bounded completed list.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub queue: Vec<Run>,
    pub completed: Vec<Run>,
}

/// What a subscriber observes. For any single run the order is always
/// queued → started → progress* → exactly one terminal event, followed by a
/// `HistoryUpdated` carrying the fresh snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RunEvent {
    RunQueued(Run),
    RunStarted(Run),
    RunProgress(Run),
    RunFinished(Run),
    RunFailed(Run),
    RunCancelled(Run),
    HistoryUpdated(HistorySnapshot),
}

impl RunEvent {
    /// Wire name of this event, as consumers subscribe to it.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunQueued(_) => "runQueued",
            RunEvent::RunStarted(_) => "runStarted",
            RunEvent::RunProgress(_) => "runProgress",
            RunEvent::RunFinished(_) => "runFinished",
            RunEvent::RunFailed(_) => "runFailed",
            RunEvent::RunCancelled(_) => "runCancelled",
            RunEvent::HistoryUpdated(_) => "historyUpdated",
        }
    }

    /// The run snapshot this event carries, if it is a per-run event.
    pub fn run(&self) -> Option<&Run> {
        match self {
            RunEvent::RunQueued(r)
            | RunEvent::RunStarted(r)
            | RunEvent::RunProgress(r)
            | RunEvent::RunFinished(r)
            | RunEvent::RunFailed(r)
            | RunEvent::RunCancelled(r) => Some(r),
            RunEvent::HistoryUpdated(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunState;

    #[test]
    fn events_tag_with_wire_names() {
        let run = Run::new(1, "echo".into(), "unknown".into(), serde_json::json!({}));
        let json = serde_json::to_value(RunEvent::RunQueued(run)).unwrap();
        assert_eq!(json["event"], "runQueued");
        assert_eq!(json["data"]["id"], 1);

        let json = serde_json::to_value(RunEvent::HistoryUpdated(HistorySnapshot::default())).unwrap();
        assert_eq!(json["event"], "historyUpdated");
        assert!(json["data"]["queue"].as_array().unwrap().is_empty());
    }

    #[test]
    fn run_accessor_skips_history_events() {
        let mut run = Run::new(2, "echo".into(), "unknown".into(), serde_json::json!({}));
        run.state = RunState::Running;
        assert_eq!(RunEvent::RunStarted(run).run().map(|r| r.id), Some(2));
        assert!(RunEvent::HistoryUpdated(HistorySnapshot::default()).run().is_none());
    }
}
