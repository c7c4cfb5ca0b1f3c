//! The unit of scheduled work.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Lifecycle state of a run. Transitions are strictly forward; `Done`,
/// `Failed`, and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Cancelled)
    }
}

/// One scheduled invocation of a named remote tool.
///
/// Consumers only ever see snapshots of this; the scheduler owns the live
/// copy. Field names serialize in the wire form downstream loggers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: u64,
    pub tool: String,
    /// Best-effort display label, not a structural guarantee.
    pub model: String,
    pub arguments: serde_json::Value,
    pub state: RunState,
    pub enqueued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    pub elapsed_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl Run {
    pub(crate) fn new(id: u64, tool: String, model: String, arguments: serde_json::Value) -> Self {
        Self {
            id,
            tool,
            model,
            arguments,
            state: RunState::Queued,
            enqueued_at: now_ms(),
            started_at: None,
            finished_at: None,
            elapsed_ms: 0,
            result: None,
            error: None,
            cancelled: false,
        }
    }

    /// Recompute `elapsed_ms` against `now`:
    /// `(finished_at ?? now) - (started_at ?? enqueued_at)`, floored at 0.
    pub(crate) fn refresh_elapsed(&mut self, now: i64) {
        let end = self.finished_at.unwrap_or(now);
        let start = self.started_at.unwrap_or(self.enqueued_at);
        self.elapsed_ms = (end - start).max(0);
    }
}

/// Pick a display model label for a call.
///
/// `meta` wins when given. Otherwise sniff the untyped arguments: a string
/// `model` field on an object, else the first array element carrying one.
/// Falls back to "unknown".
pub(crate) fn extract_model(meta: Option<&str>, arguments: &serde_json::Value) -> String {
    if let Some(model) = meta {
        return model.to_string();
    }
    match arguments {
        serde_json::Value::Object(map) => {
            if let Some(model) = map.get("model").and_then(|v| v.as_str()) {
                return model.to_string();
            }
        }
        serde_json::Value::Array(items) => {
            if let Some(model) = items
                .iter()
                .find_map(|item| item.get("model").and_then(|v| v.as_str()))
            {
                return model.to_string();
            }
        }
        _ => {}
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_states() {
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
    }

    #[test]
    fn new_run_starts_queued() {
        let run = Run::new(1, "echo".into(), "unknown".into(), json!({}));
        assert_eq!(run.state, RunState::Queued);
        assert!(run.started_at.is_none());
        assert!(run.finished_at.is_none());
        assert!(!run.cancelled);
    }

    #[test]
    fn elapsed_before_start_counts_from_enqueue() {
        let mut run = Run::new(1, "echo".into(), "unknown".into(), json!({}));
        run.enqueued_at = 1000;
        run.refresh_elapsed(1600);
        assert_eq!(run.elapsed_ms, 600);
    }

    #[test]
    fn elapsed_uses_started_and_finished_when_set() {
        let mut run = Run::new(1, "echo".into(), "unknown".into(), json!({}));
        run.enqueued_at = 1000;
        run.started_at = Some(2000);
        run.finished_at = Some(2750);
        run.refresh_elapsed(9999);
        assert_eq!(run.elapsed_ms, 750);
    }

    #[test]
    fn elapsed_is_floored_at_zero() {
        let mut run = Run::new(1, "echo".into(), "unknown".into(), json!({}));
        run.started_at = Some(5000);
        run.refresh_elapsed(4000); // clock went backwards
        assert_eq!(run.elapsed_ms, 0);
    }

    #[test]
    fn model_from_meta_wins() {
        let label = extract_model(Some("claude-x"), &json!({"model": "other"}));
        assert_eq!(label, "claude-x");
    }

    #[test]
    fn model_sniffed_from_object() {
        assert_eq!(
            extract_model(None, &json!({"model": "gpt-4o", "prompt": "hi"})),
            "gpt-4o"
        );
    }

    #[test]
    fn model_sniffed_from_first_array_element_with_model() {
        let args = json!([{"x": 1}, {"model": "claude-y"}, {"model": "ignored"}]);
        assert_eq!(extract_model(None, &args), "claude-y");
    }

    #[test]
    fn model_defaults_to_unknown() {
        assert_eq!(extract_model(None, &json!({"prompt": "hi"})), "unknown");
        assert_eq!(extract_model(None, &json!({"model": 42})), "unknown");
        assert_eq!(extract_model(None, &json!("just a string")), "unknown");
    }

    #[test]
    fn run_serializes_in_wire_form() {
        let mut run = Run::new(3, "echo".into(), "unknown".into(), json!({}));
        run.enqueued_at = 123;
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["state"], "queued");
        assert_eq!(json["enqueuedAt"], 123);
        assert!(json.get("startedAt").is_none());
        assert!(json.get("cancelled").is_none());
    }
}
