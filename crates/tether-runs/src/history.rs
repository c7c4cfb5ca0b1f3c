//! Bounded record of completed runs.

use crate::run::Run;
use std::collections::VecDeque;

/// Completed-run cache: append-only up to `cap`, oldest evicted first.
/// Re-recording an id replaces the stale snapshot in place.
#[derive(Debug)]
pub(crate) struct RunHistory {
    completed: VecDeque<Run>,
    cap: usize,
}

impl RunHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            completed: VecDeque::with_capacity(cap.min(128)),
            cap,
        }
    }

    pub fn record(&mut self, run: Run) {
        if let Some(existing) = self.completed.iter_mut().find(|r| r.id == run.id) {
            *existing = run;
            return;
        }
        self.completed.push_back(run);
        while self.completed.len() > self.cap {
            self.completed.pop_front();
        }
    }

    /// Owned copy; mutating it cannot touch internal state.
    pub fn snapshot(&self) -> Vec<Run> {
        self.completed.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunState;

    fn done_run(id: u64) -> Run {
        let mut run = Run::new(id, "echo".into(), "unknown".into(), serde_json::json!({}));
        run.state = RunState::Done;
        run
    }

    #[test]
    fn records_in_completion_order() {
        let mut history = RunHistory::new(10);
        for id in 1..=3 {
            history.record(done_run(id));
        }
        let snap = history.snapshot();
        assert_eq!(snap.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn evicts_oldest_beyond_cap() {
        let mut history = RunHistory::new(100);
        for id in 1..=150 {
            history.record(done_run(id));
        }
        assert_eq!(history.len(), 100);
        let snap = history.snapshot();
        assert_eq!(snap.first().map(|r| r.id), Some(51));
        assert_eq!(snap.last().map(|r| r.id), Some(150));
    }

    #[test]
    fn same_id_replaces_in_place() {
        let mut history = RunHistory::new(10);
        history.record(done_run(1));
        history.record(done_run(2));

        let mut updated = done_run(1);
        updated.state = RunState::Cancelled;
        updated.cancelled = true;
        history.record(updated);

        assert_eq!(history.len(), 2);
        let snap = history.snapshot();
        assert_eq!(snap[0].id, 1);
        assert_eq!(snap[0].state, RunState::Cancelled);
        assert_eq!(snap[1].id, 2);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut history = RunHistory::new(10);
        history.record(done_run(1));
        let mut snap = history.snapshot();
        snap[0].state = RunState::Failed;
        snap.clear();
        assert_eq!(history.len(), 1);
        assert_eq!(history.snapshot()[0].state, RunState::Done);
    }
}
