//! Outstanding-request bookkeeping.
//!
//! Every request the transport writes gets a fresh id here; the reader task
//! hands incoming responses back through [`Correlator::resolve`]. Each id is
//! settled at most once: resolve and discard both remove the entry, and
//! operations on an absent id are no-ops.

use crate::jsonrpc::Response;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

#[derive(Debug)]
pub(crate) struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Strictly increasing, starting at 1, never reused.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `id` and return the receiver its response will arrive on.
    pub fn register(&self, id: u64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    /// Deliver a response to the waiter for `id`. Returns false if no such
    /// request is pending (already settled, timed out, or never issued).
    pub fn resolve(&self, id: u64, response: Response) -> bool {
        match self.lock().remove(&id) {
            // The waiter may have gone away (timeout, abandoned call); a
            // failed send just drops the response.
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    /// Forget a pending request without delivering anything. No-op when the
    /// id is absent.
    pub fn discard(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Response>>> {
        // Held only for map ops, never across an await.
        self.pending.lock().expect("pending map poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: u64) -> Response {
        serde_json::from_str(&format!(r#"{{"jsonrpc":"2.0","id":{id},"result":42}}"#)).unwrap()
    }

    #[test]
    fn ids_strictly_increase_from_one() {
        let c = Correlator::new();
        assert_eq!(c.next_id(), 1);
        assert_eq!(c.next_id(), 2);
        assert_eq!(c.next_id(), 3);
    }

    #[tokio::test]
    async fn resolve_delivers_to_registered_waiter() {
        let c = Correlator::new();
        let rx = c.register(1);
        assert!(c.resolve(1, response(1)));
        let resp = rx.await.unwrap();
        assert_eq!(resp.result.unwrap(), 42);
    }

    #[test]
    fn resolve_unknown_id_is_noop() {
        let c = Correlator::new();
        assert!(!c.resolve(99, response(99)));
    }

    #[tokio::test]
    async fn second_resolve_is_noop() {
        let c = Correlator::new();
        let _rx = c.register(5);
        assert!(c.resolve(5, response(5)));
        assert!(!c.resolve(5, response(5)));
    }

    #[test]
    fn discard_removes_entry_once() {
        let c = Correlator::new();
        let _rx = c.register(2);
        assert!(c.discard(2));
        assert!(!c.discard(2));
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn fuzzed_out_of_order_and_duplicate_deliveries_settle_once() {
        let c = Correlator::new();
        let mut receivers = Vec::new();
        for _ in 0..8 {
            let id = c.next_id();
            receivers.push((id, c.register(id)));
        }
        // Deliver in a scrambled order, each id twice, plus ids never issued.
        let order = [5u64, 2, 8, 2, 11, 1, 5, 3, 7, 99, 4, 8, 6, 1, 3, 7, 4, 6];
        let mut first_deliveries = 0;
        for id in order {
            if c.resolve(id, response(id)) {
                first_deliveries += 1;
            }
        }
        assert_eq!(first_deliveries, 8);
        assert_eq!(c.pending_count(), 0);
        for (id, rx) in receivers {
            let resp = rx.await.unwrap();
            assert_eq!(resp.id, Some(id));
        }
    }
}
